//! Entity lifecycle tests against one context.
//!
//! These cover the write paths end to end: statement emission, dirty
//! tracking, identity preservation and hook ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rowcache::schema::{
    AutoIncrement, Capability, DeletedAt, DeletedBy, EditedAt, Field, EntityHooks, Split, Table,
};
use rowcache::storage::{MemoryDatabase, Query};
use rowcache::{vars, Context, EngineConfig, Entity, EntityRef, Error};

fn setup(table: Table) -> (Arc<MemoryDatabase>, Arc<Table>, Context) {
    let table = Arc::new(table);
    let db = Arc::new(MemoryDatabase::new());
    db.create_table(&table);
    let ctx = Context::new(db.clone(), EngineConfig::default());
    (db, table, ctx)
}

fn t_table() -> Table {
    Table::builder("t")
        .column(AutoIncrement::new("id"))
        .column(Field::new("name"))
        .build()
}

fn insert(ctx: &mut Context, table: &Arc<Table>, initial: rowcache::Vars) -> EntityRef {
    ctx.blank(table, &initial).insert(ctx, true).unwrap()
}

/// Insert, modify and save a single-key row.
#[test]
fn test_insert_then_update_scenario() {
    let (db, table, mut ctx) = setup(t_table());

    let row = insert(&mut ctx, &table, vars! { "name" => "a" });
    assert_eq!(row.id().as_str(), "1");
    assert!(row.is_persisted());
    assert!(!row.is_dirty());

    row.set_var("name", Some("b".into()));
    assert!(row.is_dirty());
    assert_eq!(row.dirty_vars(), vars! { "name" => "b" });

    db.clear_log();
    let saved = row.save(&mut ctx, true).unwrap();
    let statements = db.statements();
    assert_eq!(statements, vec![r#"UPDATE `t` SET `name`="b" WHERE `id` = "1""#]);

    assert!(!saved.is_dirty());
    let cached = ctx.find_cached(&table, &["1"]).unwrap();
    assert!(cached.ptr_eq(&row));
    assert_eq!(cached.var("name").as_deref(), Some("b"));
}

/// Setting the current value and saving writes nothing.
#[test]
fn test_dirty_noop_issues_no_statement() {
    let (db, table, mut ctx) = setup(t_table());
    let row = insert(&mut ctx, &table, vars! { "name" => "a" });

    db.clear_log();
    assert!(!row.set_var("name", Some("a".into())));
    row.save(&mut ctx, true).unwrap();
    assert_eq!(db.write_count(), 0);
}

/// Two lookups of one id share an instance.
#[test]
fn test_identity_map_shares_instances() {
    let (_db, table, mut ctx) = setup(t_table());
    insert(&mut ctx, &table, vars! { "name" => "a" });

    let first = ctx.find_cached(&table, &["1"]).unwrap();
    let second = ctx.find_cached(&table, &["1"]).unwrap();
    assert!(first.ptr_eq(&second));

    first.set_var("name", Some("changed".into()));
    assert_eq!(second.var("name").as_deref(), Some("changed"));
}

/// Recache folds a fresh copy into the tracked instance.
#[test]
fn test_recache_mutates_existing_instance() {
    let (_db, table, mut ctx) = setup(t_table());
    let tracked = insert(&mut ctx, &table, vars! { "name" => "a" });

    let copy = EntityRef::new(Entity::hydrate(
        Arc::clone(&table),
        vars! { "id" => "1", "name" => "z" },
    ));
    let back = ctx.recache(&copy);

    assert!(back.ptr_eq(&tracked));
    assert!(!back.ptr_eq(&copy));
    assert_eq!(tracked.var("name").as_deref(), Some("z"));
}

/// clear_cache empties the map; the next init tracks a new instance.
#[test]
fn test_clear_cache_then_init_cached() {
    let (_db, table, mut ctx) = setup(t_table());
    let old = insert(&mut ctx, &table, vars! { "name" => "a" });

    ctx.clear_cache(&table);
    assert!(ctx.find_cached(&table, &["1"]).is_none());

    let fresh = ctx.init_cached(&table, vars! { "id" => "1", "name" => "a" }, true);
    assert!(!fresh.ptr_eq(&old));
    assert!(ctx.find_cached(&table, &["1"]).unwrap().ptr_eq(&fresh));
}

/// Composite ids join in declared order and split back to the row.
#[test]
fn test_composite_key_round_trip() {
    let (_db, table, mut ctx) = setup(
        Table::builder("membership")
            .column(Field::new("user").primary())
            .column(Field::new("group").primary())
            .column(Field::new("role").initial("member"))
            .build(),
    );
    let row = insert(&mut ctx, &table, vars! { "user" => "7", "group" => "3" });
    let id = row.id();
    assert_eq!(id.as_str(), "7:3");

    ctx.clear_cache(&table);
    let parts = id.parts();
    let found = ctx.find_by_id(&table, &parts).unwrap();
    assert_eq!(found.var("role").as_deref(), Some("member"));
    assert!(ctx.find_by_gid(&table, "7:3").unwrap().ptr_eq(&found));
}

/// REPLACE needs a meaningful key; otherwise it becomes an INSERT.
#[test]
fn test_replace_falls_back_to_insert() {
    let (db, table, mut ctx) = setup(t_table());

    let row = ctx.blank(&table, &vars! { "name" => "a" });
    assert!(row.id().is_degenerate());
    row.replace(&mut ctx, true).unwrap();
    assert!(db.statements()[0].starts_with("INSERT"));
    assert_eq!(row.id().as_str(), "1");

    let (db, table, mut ctx) = setup(
        Table::builder("pair")
            .column(Field::new("a").primary())
            .column(Field::new("b").primary())
            .build(),
    );
    let zero = ctx.blank(&table, &vars! { "a" => "0", "b" => "0" });
    zero.replace(&mut ctx, true).unwrap();
    let half = ctx.blank(&table, &vars! { "a" => "5", "b" => "0" });
    half.replace(&mut ctx, true).unwrap();

    let statements = db.statements();
    assert!(statements[0].starts_with("INSERT"));
    assert!(statements[1].starts_with("REPLACE"));
}

/// Replace overwrites an existing row and keeps the tracked instance.
#[test]
fn test_replace_existing_row() {
    let (db, table, mut ctx) = setup(t_table());
    let tracked = insert(&mut ctx, &table, vars! { "name" => "a" });

    let copy = ctx.blank(&table, &vars! { "id" => "1", "name" => "b" });
    let back = copy.replace(&mut ctx, true).unwrap();

    assert!(back.ptr_eq(&tracked));
    assert_eq!(tracked.var("name").as_deref(), Some("b"));
    assert_eq!(db.row_count("t"), 1);
}

/// A persisted entity without column data never reaches storage.
#[test]
fn test_empty_row_is_rejected() {
    let (db, table, mut ctx) = setup(t_table());
    let empty = EntityRef::new(Entity::hydrate(Arc::clone(&table), rowcache::Vars::new()));
    assert!(empty.is_persisted());

    assert!(matches!(empty.save(&mut ctx, true), Err(Error::EmptyRow { .. })));
    assert!(matches!(empty.insert(&mut ctx, true), Err(Error::EmptyRow { .. })));
    assert!(matches!(empty.replace(&mut ctx, true), Err(Error::EmptyRow { .. })));
    assert_eq!(db.write_count(), 0);
    assert!(ctx.pending_invalidations().is_empty());
}

/// A failed write leaves the entity exactly as it was.
#[test]
fn test_failed_write_keeps_dirty() {
    let (db, table, mut ctx) = setup(t_table());
    let row = insert(&mut ctx, &table, vars! { "name" => "a" });

    row.set_var("name", Some("b".into()));
    db.fail_next_write("lost connection");
    match row.save(&mut ctx, true) {
        Err(Error::Storage(msg)) => assert_eq!(msg, "lost connection"),
        other => panic!("expected storage error, got {:?}", other),
    }
    assert!(row.is_dirty());
    assert_eq!(row.dirty_vars(), vars! { "name" => "b" });

    row.save(&mut ctx, true).unwrap();
    assert!(!row.is_dirty());
}

/// A failed insert leaves the entity unpersisted and untracked.
#[test]
fn test_failed_insert_stays_unpersisted() {
    let (db, table, mut ctx) = setup(t_table());
    let row = ctx.blank(&table, &vars! { "name" => "a" });

    db.fail_next_write("disk full");
    assert!(row.insert(&mut ctx, true).is_err());
    assert!(!row.is_persisted());
    assert!(row.is_dirty());
    assert!(ctx.pending_invalidations().is_empty());
}

#[test]
fn test_physical_delete() {
    let (db, table, mut ctx) = setup(t_table());
    let row = insert(&mut ctx, &table, vars! { "name" => "a" });

    row.delete(&mut ctx, true).unwrap();
    assert!(!row.is_persisted());
    assert!(row.is_deleted());
    assert_eq!(db.row_count("t"), 0);
    assert!(ctx.find_cached(&table, &["1"]).is_none());

    // Deleting again is a no-op.
    db.clear_log();
    row.delete(&mut ctx, true).unwrap();
    assert_eq!(db.write_count(), 0);
}

/// Deleting through a copy also retires the instance the context tracks.
#[test]
fn test_delete_through_copy_retires_tracked() {
    let (db, table, mut ctx) = setup(t_table());
    let tracked = insert(&mut ctx, &table, vars! { "name" => "a" });

    let copy = ctx.blank(&table, &vars! { "id" => "1", "name" => "b" });
    assert!(copy.replace(&mut ctx, true).unwrap().ptr_eq(&tracked));
    assert!(!copy.ptr_eq(&tracked));

    copy.delete(&mut ctx, true).unwrap();
    assert!(!copy.is_persisted());
    assert!(!tracked.is_persisted());
    assert!(ctx.find_cached(&table, &["1"]).is_none());
    assert_eq!(db.row_count("t"), 0);

    // The tracked instance now knows there is nothing left to delete.
    db.clear_log();
    tracked.delete(&mut ctx, true).unwrap();
    assert_eq!(db.write_count(), 0);
}

/// Without soft-delete columns mark_deleted removes the row.
#[test]
fn test_mark_deleted_without_columns_deletes() {
    let (db, table, mut ctx) = setup(t_table());
    let row = insert(&mut ctx, &table, vars! { "name" => "a" });

    row.mark_deleted(&mut ctx, true).unwrap();
    assert!(!row.is_persisted());
    assert_eq!(db.row_count("t"), 0);
}

/// With soft-delete columns the row is updated and stays persisted.
#[test]
fn test_mark_deleted_with_columns_updates() {
    let (db, table, mut ctx) = setup(
        Table::builder("posts")
            .column(AutoIncrement::new("id"))
            .column(Field::new("title"))
            .column(DeletedAt::new("deleted_at"))
            .column(DeletedBy::new("deleted_by"))
            .build(),
    );
    ctx.set_actor("42");
    let row = insert(&mut ctx, &table, vars! { "title" => "hello" });
    assert!(!row.is_deleted());

    db.clear_log();
    let saved = row.mark_deleted(&mut ctx, true).unwrap();
    assert!(saved.ptr_eq(&row));
    assert!(row.is_persisted());
    assert!(row.is_deleted());
    assert_eq!(row.column_var_of(Capability::DeletedBy).as_deref(), Some("42"));
    assert!(row.column_var_of(Capability::DeletedAt).is_some());
    assert_eq!(db.row_count("posts"), 1);

    let statements = db.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("UPDATE"));
}

#[test]
fn test_mark_deleted_unpersisted_is_error() {
    let (_db, table, mut ctx) = setup(
        Table::builder("posts")
            .column(AutoIncrement::new("id"))
            .column(DeletedAt::new("deleted_at"))
            .build(),
    );
    let row = ctx.blank(&table, &rowcache::Vars::new());
    assert!(matches!(
        row.mark_deleted(&mut ctx, true),
        Err(Error::UnpersistedWrite { .. })
    ));
}

#[test]
fn test_save_vars_unpersisted_is_error() {
    let (_db, table, mut ctx) = setup(t_table());
    let row = ctx.blank(&table, &vars! { "name" => "a" });
    assert!(matches!(
        row.save_var(&mut ctx, "name", Some("b"), true),
        Err(Error::UnpersistedWrite { .. })
    ));
}

#[test]
fn test_save_vars_unknown_column() {
    let (_db, table, mut ctx) = setup(t_table());
    let row = insert(&mut ctx, &table, vars! { "name" => "a" });
    assert!(matches!(
        row.save_var(&mut ctx, "nope", Some("x"), true),
        Err(Error::UnknownColumn { .. })
    ));
    assert!(matches!(
        row.save_value(&mut ctx, "nope", Some("x")),
        Err(Error::UnknownColumn { .. })
    ));
}

#[derive(Default)]
struct UpdateCounter {
    before: AtomicUsize,
    after: AtomicUsize,
}

struct CountingHooks(Arc<UpdateCounter>);

impl EntityHooks for CountingHooks {
    fn before_update(&self, _entity: &mut Entity, _query: &mut Query) {
        self.0.before.fetch_add(1, Ordering::SeqCst);
    }

    fn after_update(&self, _entity: &mut Entity) {
        self.0.after.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hooks fire on a no-op save_vars even though nothing is written.
#[test]
fn test_save_vars_worthy_flag() {
    let counter = Arc::new(UpdateCounter::default());
    let (db, table, mut ctx) = setup(
        Table::builder("t")
            .column(AutoIncrement::new("id"))
            .column(Field::new("name"))
            .column(EditedAt::new("edited_at"))
            .hooks(CountingHooks(Arc::clone(&counter)))
            .build(),
    );
    let row = insert(&mut ctx, &table, vars! { "name" => "a" });

    db.clear_log();
    assert!(!row.save_var(&mut ctx, "name", Some("a"), true).unwrap());
    assert_eq!(db.write_count(), 0);
    assert_eq!(counter.before.load(Ordering::SeqCst), 1);
    assert_eq!(counter.after.load(Ordering::SeqCst), 1);
    assert!(row.var("edited_at").is_none());

    assert!(row.save_var(&mut ctx, "name", Some("b"), true).unwrap());
    assert_eq!(db.write_count(), 1);
    assert!(db.statements()[0].contains("`edited_at`="));
    assert!(row.var("edited_at").is_some());
    assert_eq!(counter.after.load(Ordering::SeqCst), 2);

    // Without hooks nothing is counted and nothing is stamped.
    row.save_var(&mut ctx, "name", Some("c"), false).unwrap();
    assert_eq!(counter.before.load(Ordering::SeqCst), 2);
}

/// save_vars cleans only the keys it wrote.
#[test]
fn test_save_vars_partial_clean() {
    let (_db, table, mut ctx) = setup(
        Table::builder("t")
            .column(AutoIncrement::new("id"))
            .column(Field::new("name"))
            .column(Field::new("email"))
            .build(),
    );
    let row = insert(&mut ctx, &table, vars! { "name" => "a" });

    row.set_var("name", Some("b".into()));
    row.set_var("email", Some("b@x".into()));
    row.save_var(&mut ctx, "name", Some("b2"), true).unwrap();

    assert!(row.is_dirty());
    assert_eq!(row.dirty_vars(), vars! { "email" => "b@x" });
}

struct RecordIds(Arc<Mutex<Vec<Option<String>>>>);

impl EntityHooks for RecordIds {
    fn after_create(&self, entity: &mut Entity) {
        self.0.lock().push(entity.var("id").map(str::to_string));
    }
}

/// Column hooks run before the table hooks, so the id is already there.
#[test]
fn test_column_hooks_run_before_entity_hooks() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (_db, table, mut ctx) = setup(
        Table::builder("t")
            .column(AutoIncrement::new("id"))
            .column(Field::new("name"))
            .hooks(RecordIds(Arc::clone(&seen)))
            .build(),
    );

    insert(&mut ctx, &table, vars! { "name" => "a" });
    insert(&mut ctx, &table, vars! { "name" => "b" });
    assert_eq!(*seen.lock(), vec![Some("1".to_string()), Some("2".to_string())]);

    // Skipping hooks still captures the generated key.
    let quiet = ctx.blank(&table, &vars! { "name" => "c" });
    quiet.insert(&mut ctx, false).unwrap();
    assert_eq!(quiet.id().as_str(), "3");
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn test_increase() {
    let (db, table, mut ctx) = setup(
        Table::builder("counters")
            .column(AutoIncrement::new("id"))
            .column(Field::new("visits"))
            .column(Field::new("label"))
            .build(),
    );
    let row = insert(&mut ctx, &table, vars! { "label" => "home" });

    assert!(row.increase(&mut ctx, "visits", 3).unwrap());
    assert_eq!(row.var("visits").as_deref(), Some("3"));
    assert!(row.increase(&mut ctx, "visits", -1).unwrap());
    assert_eq!(row.var("visits").as_deref(), Some("2"));

    db.clear_log();
    assert!(!row.increase(&mut ctx, "visits", 0).unwrap());
    assert_eq!(db.write_count(), 0);

    match row.increase(&mut ctx, "label", 1) {
        Err(Error::NotNumeric { column, value }) => {
            assert_eq!(column, "label");
            assert_eq!(value.as_deref(), Some("home"));
        }
        other => panic!("expected NotNumeric, got {:?}", other),
    }
}

#[test]
fn test_increase_overflow() {
    let (db, table, mut ctx) = setup(
        Table::builder("counters")
            .column(AutoIncrement::new("id"))
            .column(Field::new("visits"))
            .build(),
    );
    let row = insert(&mut ctx, &table, vars! { "visits" => "9223372036854775807" });

    db.clear_log();
    match row.increase(&mut ctx, "visits", 1) {
        Err(Error::NotNumeric { column, value }) => {
            assert_eq!(column, "visits");
            assert_eq!(value.as_deref(), Some("9223372036854775807"));
        }
        other => panic!("expected NotNumeric, got {:?}", other),
    }
    assert_eq!(row.var("visits").as_deref(), Some("9223372036854775807"));
    assert!(!row.is_dirty());
    assert_eq!(db.write_count(), 0);

    assert!(row.increase(&mut ctx, "visits", -1).unwrap());
    assert_eq!(row.var("visits").as_deref(), Some("9223372036854775806"));
}

/// One semantic value written across several storage columns.
#[test]
fn test_split_column_writes_parts() {
    let (db, table, mut ctx) = setup(
        Table::builder("places")
            .column(AutoIncrement::new("id"))
            .column(Split::new("position", ',', ["lat", "lng"]))
            .build(),
    );
    let row = insert(&mut ctx, &table, vars! { "position" => "1,2" });

    row.set_var("position", Some("1,3".into()));
    assert_eq!(row.dirty_vars(), vars! { "lat" => "1", "lng" => "3" });

    db.clear_log();
    row.save(&mut ctx, true).unwrap();
    assert_eq!(db.statements().len(), 1);

    ctx.clear_cache(&table);
    let reread = ctx.find_by_id(&table, &["1"]).unwrap();
    assert_eq!(reread.var("lng").as_deref(), Some("3"));
}

#[test]
fn test_save_value_routes_through_column() {
    let (_db, table, mut ctx) = setup(
        Table::builder("places")
            .column(AutoIncrement::new("id"))
            .column(Split::new("position", ',', ["lat", "lng"]))
            .build(),
    );
    let row = insert(&mut ctx, &table, vars! { "position" => "1,2" });

    assert!(row.save_value(&mut ctx, "position", Some("5,6")).unwrap());
    assert_eq!(row.var("lat").as_deref(), Some("5"));
    assert_eq!(row.var("lng").as_deref(), Some("6"));
}
