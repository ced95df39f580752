//! The per-process registry.
//!
//! A [`Context`] owns everything one process (or one test) needs: the
//! identity maps, the shared-cache front, the invalidation outbox and the
//! storage handle. Nothing is global; two contexts sharing one database,
//! one cache backend and one bus behave like two worker processes.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{
    CacheBackend, CacheStats, IdentityCache, Invalidation, InvalidationQueue,
    InvalidationTransport, SharedCache,
};
use crate::common::config::{all_rows_key, row_key, ID_SEPARATOR};
use crate::common::{EngineConfig, Error, Result, RowId, Vars};
use crate::entity::{lifecycle, Entity, EntityRef};
use crate::schema::{HookEnv, Table};
use crate::storage::{Database, Query, QueryKind, WriteOutcome};

/// Registry of caches and collaborators for one process.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                          Context                             │
/// │  ┌──────────────────┐  ┌──────────────┐  ┌───────────────┐   │
/// │  │ caches           │  │ shared       │  │ db            │   │
/// │  │ table → Identity │─▶│ SharedCache  │─▶│ dyn Database  │   │
/// │  └──────────────────┘  └──────────────┘  └───────────────┘   │
/// │  ┌──────────────────┐  ┌──────────────┐  ┌───────────────┐   │
/// │  │ outbox           │─▶│ transport    │  │ stats         │   │
/// │  │ Invalidations    │  │ (optional)   │  │ CacheStats    │   │
/// │  └──────────────────┘  └──────────────┘  └───────────────┘   │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// Reads go identity map → shared tier → storage and populate the tiers on
/// the way back. Writes go through [`EntityRef`]; after storage accepts one,
/// the entity is folded back via [`recache`](Self::recache) or
/// [`uncache`](Self::uncache), which also queue the invalidation that
/// [`end_unit_of_work`](Self::end_unit_of_work) broadcasts.
///
/// # Usage
/// ```
/// use std::sync::Arc;
/// use rowcache::schema::{AutoIncrement, Field, Table};
/// use rowcache::storage::MemoryDatabase;
/// use rowcache::{vars, Context, EngineConfig};
///
/// let users = Arc::new(
///     Table::builder("users")
///         .column(AutoIncrement::new("id"))
///         .column(Field::new("name"))
///         .build(),
/// );
/// let db = Arc::new(MemoryDatabase::new());
/// db.create_table(&users);
///
/// let mut ctx = Context::new(db, EngineConfig::default());
/// let user = ctx.blank(&users, &vars! { "name" => "a" });
/// let user = user.insert(&mut ctx, true).unwrap();
///
/// let again = ctx.find_by_id(&users, &["1"]).unwrap();
/// assert!(again.ptr_eq(&user));
/// ctx.end_unit_of_work();
/// ```
pub struct Context {
    db: Arc<dyn Database>,
    config: EngineConfig,
    actor: Option<String>,
    caches: HashMap<String, IdentityCache>,
    shared: SharedCache,
    outbox: InvalidationQueue,
    transport: Option<Box<dyn InvalidationTransport>>,
    stats: Arc<CacheStats>,
}

impl Context {
    pub fn new(db: Arc<dyn Database>, config: EngineConfig) -> Self {
        let stats = Arc::new(CacheStats::new());
        let shared = SharedCache::new(
            None,
            config.key_prefix.clone(),
            config.shared_ttl,
            Arc::clone(&stats),
        );
        Self {
            db,
            config,
            actor: None,
            caches: HashMap::new(),
            shared,
            outbox: InvalidationQueue::new(),
            transport: None,
            stats,
        }
    }

    /// Attach the shared cache tier.
    pub fn with_shared_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.shared.set_backend(backend);
        self
    }

    /// Attach the invalidation transport.
    pub fn with_transport(mut self, transport: impl InvalidationTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Set the acting user recorded by created-by / deleted-by columns.
    pub fn set_actor(&mut self, actor: impl Into<String>) {
        self.actor = Some(actor.into());
    }

    /// Fall back to the configured system actor.
    pub fn clear_actor(&mut self) {
        self.actor = None;
    }

    pub fn actor(&self) -> &str {
        self.actor.as_deref().unwrap_or(&self.config.system_actor)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The identity map of `table`, if one has been created.
    pub fn identity(&self, table: &str) -> Option<&IdentityCache> {
        self.caches.get(table)
    }

    /// Ambient values for hooks, stamped now.
    pub fn hook_env(&self) -> HookEnv {
        HookEnv::new(self.actor())
    }

    /// A blank, unpersisted entity of `table`.
    pub fn blank(&self, table: &Arc<Table>, initial: &Vars) -> EntityRef {
        EntityRef::new(table.blank(initial, &self.hook_env()))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn process_cached(&self, table: &Table) -> bool {
        self.config.process_cache && table.is_cached()
    }

    fn shares(&self, table: &Table) -> bool {
        self.config.shared_cache && table.is_shared_cached() && self.shared.is_enabled()
    }

    fn identity_mut(&mut self, table: &Arc<Table>) -> &mut IdentityCache {
        self.caches
            .entry(table.name().to_string())
            .or_insert_with(|| IdentityCache::new(Arc::clone(table)))
    }

    pub(crate) fn cached(&self, table: &Table, id: &RowId) -> Option<EntityRef> {
        self.caches.get(table.name()).and_then(|c| c.get(id))
    }

    pub(crate) fn execute(&self, query: &Query) -> Result<WriteOutcome> {
        let outcome = self.db.execute(query)?;
        CacheStats::bump(&self.stats.storage_writes);
        debug!(table = query.table(), kind = ?query.kind(), affected = outcome.affected_rows(), "write");
        Ok(outcome)
    }

    fn fetch(&self, query: &Query) -> Result<Vec<Vars>> {
        CacheStats::bump(&self.stats.storage_reads);
        self.db.fetch(query)
    }

    fn materialize(&self, table: &Arc<Table>, row: Vars) -> EntityRef {
        let mut entity = Entity::hydrate(Arc::clone(table), row);
        lifecycle::after_read(&mut entity, &self.hook_env());
        EntityRef::new(entity)
    }

    fn checked_id(&self, table: &Table, parts: &[&str]) -> Result<RowId> {
        let expected = table.primary_key_names().len();
        if parts.len() != expected {
            return Err(Error::InvalidId {
                table: table.name().to_string(),
                expected,
                got: parts.len(),
            });
        }
        Ok(RowId::from_parts(parts))
    }

    fn check_storage_column(table: &Table, column: &str) -> Result<()> {
        if table.has_storage_column(column) {
            Ok(())
        } else {
            Err(Error::unknown_column(table.name(), column))
        }
    }

    fn key_query(&self, table: &Table, id: &RowId) -> Query {
        let mut query = self.select(table);
        for (key, part) in table.primary_key_names().iter().zip(id.parts()) {
            query.where_eq(key, Some(part.to_string()));
        }
        query.limit(1);
        query
    }

    /// Drop one row from every tier and queue its invalidation.
    fn evict(&mut self, table: &Table, id: &RowId) {
        if self.process_cached(table) {
            if let Some(cache) = self.caches.get_mut(table.name()) {
                cache.remove(id);
            }
            self.outbox.push(Invalidation::new(table.name(), id));
        }
        if self.shares(table) {
            self.shared.remove(&row_key(table.name(), id.as_str()));
        }
    }

    // ========================================================================
    // Identity map
    // ========================================================================

    /// Look `parts` up in the identity map only.
    pub fn find_cached(&self, table: &Table, parts: &[&str]) -> Option<EntityRef> {
        if !self.process_cached(table) {
            return None;
        }
        let found = self.cached(table, &RowId::from_parts(parts));
        let counter = if found.is_some() {
            &self.stats.identity_hits
        } else {
            &self.stats.identity_misses
        };
        CacheStats::bump(counter);
        found
    }

    /// Hydrate a storage row, or reuse the instance already tracked.
    ///
    /// With `use_cache`, a tracked instance is overwritten with `row` in
    /// place; without it the tracked instance is returned untouched.
    /// Tables that are not process-cached always get a fresh instance.
    pub fn init_cached(&mut self, table: &Arc<Table>, row: Vars, use_cache: bool) -> EntityRef {
        if !self.process_cached(table) {
            return self.materialize(table, row);
        }
        let id = table.id_of(&row);
        if let Some(existing) = self.cached(table, &id) {
            if use_cache {
                let mut entity = existing.borrow_mut();
                entity.replace_vars(row);
                entity.set_persisted(true);
            }
            return existing;
        }
        let entity = self.materialize(table, row);
        self.identity_mut(table).insert(entity)
    }

    /// Storage rows also seed the shared tier the first time this process
    /// sees them.
    fn init_from_storage(&mut self, table: &Arc<Table>, row: Vars) -> EntityRef {
        let id = table.id_of(&row);
        let known = self.process_cached(table) && self.cached(table, &id).is_some();
        if !known && self.shares(table) {
            self.shared.set(&row_key(table.name(), id.as_str()), &row);
        }
        self.init_cached(table, row, true)
    }

    /// Fold a changed entity into the caches.
    ///
    /// An instance already tracked for the id keeps its identity and takes
    /// the entity's values; it is returned instead of `entity`. The shared
    /// tier is only ever updated in place, never created, so a row another
    /// process just removed stays removed. Unpersisted entities are
    /// returned unchanged.
    pub fn recache(&mut self, entity: &EntityRef) -> EntityRef {
        let (table, id) = {
            let e = entity.borrow();
            if !e.is_persisted() {
                return entity.clone();
            }
            (Arc::clone(e.table()), e.id().clone())
        };

        let mut back = entity.clone();
        if self.process_cached(&table) {
            back = self.identity_mut(&table).insert(entity.clone());
            self.outbox.push(Invalidation::new(table.name(), &id));
        }
        if self.shares(&table) {
            let vars = back.borrow().vars().clone();
            let replaced = self.shared.replace(&row_key(table.name(), id.as_str()), &vars);
            debug!(table = table.name(), %id, replaced, "recache");
        }
        // All-rows lists hold a copy of this row.
        self.uncache_all(&table);
        back
    }

    /// Forget an entity in the identity map and the shared tier.
    pub fn uncache(&mut self, entity: &EntityRef) {
        let (table, id) = {
            let e = entity.borrow();
            (Arc::clone(e.table()), e.id().clone())
        };
        debug!(table = table.name(), %id, "uncache");
        self.evict(&table, &id);
    }

    /// Wipe the table's identity map and all-rows list and flush the whole
    /// shared tier.
    pub fn clear_cache(&mut self, table: &Table) {
        if let Some(cache) = self.caches.get_mut(table.name()) {
            cache.clear();
        }
        if self.config.shared_cache {
            self.shared.flush();
        }
        info!(table = table.name(), "cache cleared");
    }

    /// Drop the table's all-rows list locally and in the shared tier.
    pub fn uncache_all(&mut self, table: &Table) {
        if let Some(cache) = self.caches.get_mut(table.name()) {
            cache.clear_all_rows();
        }
        if self.shares(table) {
            self.shared.remove(&all_rows_key(table.name()));
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// A SELECT on `table` with every before-read hook applied.
    pub fn select(&self, table: &Table) -> Query {
        let mut query = Query::select(table.name());
        lifecycle::before_read(table, &mut query);
        query
    }

    /// Run `query` and hydrate every row through the identity map.
    pub fn fetch_all(&mut self, table: &Arc<Table>, query: &Query) -> Result<Vec<EntityRef>> {
        let rows = self.fetch(query)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.init_from_storage(table, row));
        }
        Ok(out)
    }

    /// Row by primary key parts, in declared key order.
    ///
    /// # Errors
    /// [`Error::InvalidId`] if the number of parts does not match the key.
    pub fn get_by_id(&mut self, table: &Arc<Table>, parts: &[&str]) -> Result<Option<EntityRef>> {
        let id = self.checked_id(table, parts)?;

        if self.process_cached(table) {
            if let Some(entity) = self.cached(table, &id) {
                CacheStats::bump(&self.stats.identity_hits);
                return Ok(Some(entity));
            }
            CacheStats::bump(&self.stats.identity_misses);
        }

        if self.shares(table) {
            if let Some(row) = self.shared.get::<Vars>(&row_key(table.name(), id.as_str())) {
                return Ok(Some(self.init_cached(table, row, true)));
            }
        }

        let query = self.key_query(table, &id);
        Ok(self.fetch_all(table, &query)?.into_iter().next())
    }

    /// Like [`get_by_id`](Self::get_by_id) but a miss is [`Error::NotFound`].
    pub fn find_by_id(&mut self, table: &Arc<Table>, parts: &[&str]) -> Result<EntityRef> {
        self.get_by_id(table, parts)?
            .ok_or_else(|| Error::not_found(table.name(), RowId::from_parts(parts).as_str()))
    }

    /// [`find_by_id`](Self::find_by_id) taking the joined id.
    pub fn find_by_gid(&mut self, table: &Arc<Table>, gid: &str) -> Result<EntityRef> {
        let parts: Vec<&str> = gid.split(ID_SEPARATOR).collect();
        self.find_by_id(table, &parts)
    }

    /// First row whose `column` equals `value`.
    pub fn get_by(&mut self, table: &Arc<Table>, column: &str, value: &str) -> Result<Option<EntityRef>> {
        Self::check_storage_column(table, column)?;
        let mut query = self.select(table);
        query.where_eq(column, Some(value.to_string()));
        self.get_where(table, query)
    }

    pub fn find_by(&mut self, table: &Arc<Table>, column: &str, value: &str) -> Result<EntityRef> {
        self.get_by(table, column, value)?
            .ok_or_else(|| Error::not_found(table.name(), format!("{}={}", column, value)))
    }

    /// First row matching every pair of `vars`.
    pub fn get_by_vars(&mut self, table: &Arc<Table>, vars: &Vars) -> Result<Option<EntityRef>> {
        let mut query = self.select(table);
        for (column, value) in vars.iter() {
            Self::check_storage_column(table, column)?;
            query.where_eq(column, value.map(str::to_string));
        }
        self.get_where(table, query)
    }

    /// First row of `query`.
    pub fn get_where(&mut self, table: &Arc<Table>, mut query: Query) -> Result<Option<EntityRef>> {
        query.limit(1);
        Ok(self.fetch_all(table, &query)?.into_iter().next())
    }

    pub fn all_where(&mut self, table: &Arc<Table>, query: &Query) -> Result<Vec<EntityRef>> {
        self.fetch_all(table, query)
    }

    /// Every row, ordered by the first key column.
    pub fn all(&mut self, table: &Arc<Table>) -> Result<Vec<EntityRef>> {
        let mut query = self.select(table);
        if let Some(first) = table.primary_key_names().first() {
            query.order_by(first);
        }
        self.fetch_all(table, &query)
    }

    /// Number of rows matching `query`.
    pub fn count_where(&self, query: &Query) -> Result<u64> {
        let mut query = query.clone();
        query.count();
        CacheStats::bump(&self.stats.storage_reads);
        self.db.count(&query)
    }

    /// Every row through the all-rows cache.
    ///
    /// The list is kept per process and mirrored in the shared tier under
    /// `all_<table>`. Rows taken from the shared copy never overwrite
    /// instances this process already tracks.
    pub fn all_cached(&mut self, table: &Arc<Table>) -> Result<Vec<EntityRef>> {
        if !self.process_cached(table) {
            return self.all(table);
        }
        if let Some(rows) = self.caches.get(table.name()).and_then(|c| c.all_rows()) {
            CacheStats::bump(&self.stats.identity_hits);
            return Ok(rows.to_vec());
        }
        CacheStats::bump(&self.stats.identity_misses);

        let key = all_rows_key(table.name());
        let shared_rows = if self.shares(table) {
            self.shared.get::<Vec<Vars>>(&key)
        } else {
            None
        };

        let entities = match shared_rows {
            Some(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    out.push(self.init_cached(table, row, false));
                }
                out
            }
            None => {
                let all = self.all(table)?;
                if self.shares(table) {
                    let rows: Vec<Vars> = all.iter().map(|e| e.borrow().vars().clone()).collect();
                    self.shared.set(&key, &rows);
                }
                all
            }
        };

        self.identity_mut(table).set_all_rows(entities.clone());
        Ok(entities)
    }

    /// Re-read a tracked row from storage and fold it into the caches.
    ///
    /// Returns `None` when the row is not tracked, and evicts it when
    /// storage no longer has it.
    pub fn reload(&mut self, table: &Arc<Table>, id: &RowId) -> Result<Option<EntityRef>> {
        if !self.process_cached(table) || self.cached(table, id).is_none() {
            return Ok(None);
        }
        let query = self.key_query(table, id);
        match self.fetch(&query)?.into_iter().next() {
            Some(row) => {
                let fresh = self.materialize(table, row);
                Ok(Some(self.recache(&fresh)))
            }
            None => {
                debug!(table = table.name(), %id, "reload: row is gone");
                self.evict(table, id);
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Set-based writes
    // ========================================================================

    /// Delete every row matching the conditions of `query`.
    ///
    /// With hooks the rows are loaded and deleted one at a time so every
    /// hook fires. Without, one DELETE runs and the affected ids are
    /// evicted from every tier. Returns the number of rows deleted.
    pub fn delete_where(&mut self, table: &Arc<Table>, query: &Query, with_hooks: bool) -> Result<u64> {
        // DELETE carries no order or limit, so neither does the row match.
        let mut matching = Query::select(table.name());
        for (column, value) in query.conditions() {
            matching.where_eq(column, value.clone());
        }

        if with_hooks {
            let victims = self.fetch_all(table, &matching)?;
            let mut deleted = 0;
            for victim in victims {
                victim.delete(self, true)?;
                deleted += 1;
            }
            return Ok(deleted);
        }

        let doomed: Vec<RowId> = if self.process_cached(table) || self.shares(table) {
            self.fetch(&matching)?.iter().map(|row| table.id_of(row)).collect()
        } else {
            Vec::new()
        };

        let mut delete = Query::delete(table.name());
        for (column, value) in query.conditions() {
            delete.where_eq(column, value.clone());
        }
        let outcome = self.execute(&delete)?;

        for id in &doomed {
            if let Some(entity) = self.cached(table, id) {
                entity.borrow_mut().set_persisted(false);
            }
            self.evict(table, id);
        }
        self.uncache_all(table);
        Ok(outcome.affected_rows())
    }

    /// Multi-row INSERT, chunked by [`EngineConfig::bulk_chunk_size`].
    pub fn bulk_insert(
        &mut self,
        table: &Arc<Table>,
        columns: &[&str],
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<u64> {
        self.bulk_write(table, QueryKind::Insert, columns, rows)
    }

    /// Multi-row REPLACE, chunked like [`bulk_insert`](Self::bulk_insert).
    ///
    /// Replaced rows are evicted from every tier. When `columns` does not
    /// cover the whole key the ids are unknown and the table cache is
    /// cleared instead.
    pub fn bulk_replace(
        &mut self,
        table: &Arc<Table>,
        columns: &[&str],
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<u64> {
        self.bulk_write(table, QueryKind::Replace, columns, rows)
    }

    fn bulk_write(
        &mut self,
        table: &Arc<Table>,
        kind: QueryKind,
        columns: &[&str],
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<u64> {
        for column in columns {
            Self::check_storage_column(table, column)?;
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let key_positions: Option<Vec<usize>> = table
            .primary_key_names()
            .iter()
            .map(|k| columns.iter().position(|c| c == k))
            .collect();

        let mut affected = 0;
        for chunk in rows.chunks(self.config.bulk_chunk_size.max(1)) {
            let mut query = match kind {
                QueryKind::Replace => Query::replace(table.name()),
                _ => Query::insert(table.name()),
            };
            query.bulk(columns, chunk.to_vec());
            affected += self.execute(&query)?.affected_rows();

            if kind == QueryKind::Replace {
                match &key_positions {
                    Some(positions) => {
                        for row in chunk {
                            let id = RowId::from_parts(positions.iter().map(|&i| {
                                row.get(i).and_then(|v| v.as_deref()).unwrap_or("")
                            }));
                            self.evict(table, &id);
                        }
                    }
                    None => self.clear_cache(table),
                }
            }
        }

        debug!(table = table.name(), kind = ?kind, rows = rows.len(), affected, "bulk write");
        self.uncache_all(table);
        Ok(affected)
    }

    // ========================================================================
    // Unit of work
    // ========================================================================

    /// Invalidations queued since the last flush.
    pub fn pending_invalidations(&self) -> &[Invalidation] {
        self.outbox.pending()
    }

    /// Broadcast the outbox as one batch.
    ///
    /// The outbox is always emptied. With IPC disabled or no transport the
    /// batch is dropped; a failing transport is logged and the batch lost.
    /// Returns the number of messages sent.
    pub fn end_unit_of_work(&mut self) -> usize {
        let batch = self.outbox.drain();
        if batch.is_empty() {
            return 0;
        }
        if !self.config.ipc {
            debug!(dropped = batch.len(), "ipc disabled, dropping invalidations");
            return 0;
        }
        let Some(transport) = &self.transport else {
            debug!(dropped = batch.len(), "no transport, dropping invalidations");
            return 0;
        };
        match transport.send(&batch) {
            Ok(()) => {
                self.stats
                    .invalidations_sent
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                info!(count = batch.len(), "invalidations sent");
                batch.len()
            }
            Err(e) => {
                warn!(count = batch.len(), error = %e, "invalidation broadcast failed");
                0
            }
        }
    }

    /// Apply invalidations other processes sent.
    ///
    /// Each named row is dropped from the local identity map along with
    /// its table's all-rows list. Returns the number of messages received.
    pub fn apply_invalidations(&mut self) -> usize {
        let Some(transport) = &self.transport else {
            return 0;
        };
        let batch = match transport.receive() {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "invalidation receive failed");
                return 0;
            }
        };

        for invalidation in &batch {
            if let Some(cache) = self.caches.get_mut(&invalidation.table) {
                cache.remove(&invalidation.row_id());
                cache.clear_all_rows();
            }
            CacheStats::bump(&self.stats.invalidations_applied);
        }
        if !batch.is_empty() {
            debug!(count = batch.len(), "invalidations applied");
        }
        batch.len()
    }
}
