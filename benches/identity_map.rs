use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rowcache::cache::MemoryCacheBackend;
use rowcache::schema::{AutoIncrement, Field, Table};
use rowcache::storage::MemoryDatabase;
use rowcache::{vars, Context, EngineConfig};

const ROWS: usize = 1_000;

fn seeded(config: EngineConfig) -> (Context, Arc<Table>) {
    let table = Arc::new(
        Table::builder("users")
            .column(AutoIncrement::new("id"))
            .column(Field::new("name"))
            .build(),
    );
    let db = Arc::new(MemoryDatabase::new());
    db.create_table(&table);
    let mut ctx = Context::new(db, config).with_shared_backend(Arc::new(MemoryCacheBackend::new()));
    let rows = (0..ROWS).map(|i| vec![None, Some(format!("user{}", i))]).collect();
    ctx.bulk_insert(&table, &["id", "name"], rows).expect("seed rows");
    (ctx, table)
}

fn bench_identity_hit(c: &mut Criterion) {
    let (mut ctx, table) = seeded(EngineConfig::default());
    ctx.all(&table).expect("warm identity map");

    c.bench_function("identity/get_by_id_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = i % ROWS + 1;
            let id = i.to_string();
            black_box(ctx.get_by_id(&table, &[id.as_str()]).expect("lookup"));
        });
    });
}

fn bench_shared_hit(c: &mut Criterion) {
    let (mut ctx, table) = seeded(EngineConfig::default());
    ctx.all(&table).expect("warm shared tier");

    c.bench_function("identity/get_by_id_shared_hit", |b| {
        b.iter(|| {
            ctx.clear_cache(&table);
            black_box(ctx.get_by_id(&table, &["1"]).expect("lookup"));
        });
    });
}

fn bench_storage_miss(c: &mut Criterion) {
    let (mut ctx, table) = seeded(EngineConfig::new().with_process_cache(false));

    c.bench_function("identity/get_by_id_storage", |b| {
        b.iter(|| {
            black_box(ctx.get_by_id(&table, &["500"]).expect("lookup"));
        });
    });
}

fn bench_save_roundtrip(c: &mut Criterion) {
    let (mut ctx, table) = seeded(EngineConfig::default());
    let row = ctx.find_by_id(&table, &["1"]).expect("row 1");

    c.bench_function("entity/save_var", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let name = n.to_string();
            black_box(row.save_var(&mut ctx, "name", Some(&name), true).expect("save"));
            ctx.end_unit_of_work();
        });
    });
}

fn bench_blank(c: &mut Criterion) {
    let (ctx, table) = seeded(EngineConfig::default());

    c.bench_function("entity/blank", |b| {
        b.iter(|| black_box(ctx.blank(&table, &vars! { "name" => "x" })));
    });
}

criterion_group!(
    benches,
    bench_identity_hit,
    bench_shared_hit,
    bench_storage_miss,
    bench_save_roundtrip,
    bench_blank
);
criterion_main!(benches);
