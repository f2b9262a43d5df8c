pub mod database;
pub mod derived;
pub mod hooks;
pub mod managed;

mod state;

pub use database::{Database, SessionOptions};
pub use derived::Derived;
pub use hooks::{HookFn, Hooks};
pub use managed::Managed;

use crate::{
    error::{Error, ErrorClass},
    model::{EntityDescriptor, FieldKind},
    obs::{MetricsEvent, record},
    query::{
        Bulk, BulkInvalidation, BulkOp, BulkSet, DerivedQuery, Page, PageRequest, Params,
        Projection, ProjectionRow, Query, QueryError, QueryPlan, Response, Slice, Spec, Subject,
        eval::BoundPredicate,
        executor::{Executor, StoreLookup},
    },
    record::Record,
    session::{database::Inner, state::SessionState},
    store::SessionId,
    types::{Clock, Timestamp},
    value::{Key, Value},
};
use std::{cell::RefCell, fmt, rc::Rc};
use thiserror::Error as ThisError;

///
/// SessionError
///
/// Unit-of-work failures: touching lazy state after the session is gone,
/// and optimistic-version conflicts found at flush.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum SessionError {
    #[error("lazy relation {entity}.{relation} touched outside its session")]
    DetachedFetch { entity: String, relation: String },

    #[error("stale write on {entity}[{key}]: expected version {expected}, found {found}")]
    StaleWrite {
        entity: String,
        key: Key,
        expected: u64,
        found: u64,
    },
}

impl SessionError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::DetachedFetch { .. } => ErrorClass::Detached,
            Self::StaleWrite { .. } => ErrorClass::Stale,
        }
    }
}

///
/// Session
///
/// A unit of work over one [`Database`]. Loads come back as [`Managed`]
/// records in an identity map; writes collect in the session and reach
/// the store on flush, in a fixed order: queued inserts, then dirty
/// updates, then scheduled removals. [`commit`](Self::commit) makes the
/// work permanent; dropping the session without committing rolls every
/// store write back and releases held locks.
///

pub struct Session {
    state: Rc<RefCell<SessionState>>,
}

impl Session {
    pub(crate) fn begin(db: Database, id: SessionId, options: SessionOptions) -> Self {
        Self {
            state: Rc::new(RefCell::new(SessionState::new(db, id, options))),
        }
    }

    /// Identifier this session locks under.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.state.borrow().id
    }

    /// Load one record by primary key, serving repeats from the identity
    /// map.
    pub fn get(&self, entity: &str, key: impl Into<Key>) -> Result<Option<Managed>, Error> {
        let key = key.into();
        let state = &mut *self.state.borrow_mut();
        let db = state.db.clone();
        let inner = db.inner.borrow();
        inner.descriptor(entity)?;

        let ident = (entity.to_string(), key.clone());
        if let Some(existing) = state.identity.get(&ident) {
            return Ok(Some(existing.clone()));
        }

        let Some(row) = inner.store.get(entity, &key).cloned() else {
            return Ok(None);
        };
        let weak = Rc::downgrade(&self.state);

        state.track(&inner, &weak, entity, key, row, &[]).map(Some)
    }

    /// Run a find query; rows come back managed unless the query is
    /// marked read-only.
    pub fn find(&self, query: &Query, params: &Params) -> Result<Response<Managed>, Error> {
        let plan = query.plan();
        expect_subject(plan, Subject::Find)?;
        let (rows, _) = self.select_managed(plan, params)?;

        Ok(Response::new(plan.entity.as_str(), rows))
    }

    /// Run a find query through a page window. The total is counted
    /// after filtering and de-duplication, before the window.
    pub fn find_page(
        &self,
        query: &Query,
        request: PageRequest,
        params: &Params,
    ) -> Result<Page<Managed>, Error> {
        let mut plan = query.plan().clone();
        expect_subject(&plan, Subject::Find)?;
        plan.page = Some(request.clone());
        let (rows, total) = self.select_managed(&plan, params)?;

        Ok(Page::new(rows, &request, total.unwrap_or(0)))
    }

    /// Run a find query as a slice: one extra row is fetched to learn
    /// whether a next slice exists, and no total is ever counted.
    pub fn find_slice(
        &self,
        query: &Query,
        request: PageRequest,
        params: &Params,
    ) -> Result<Slice<Managed>, Error> {
        let mut plan = query.plan().clone();
        expect_subject(&plan, Subject::Find)?;
        for (field, direction) in request.sort.keys() {
            plan.order = plan.order.and(field.clone(), *direction);
        }
        plan.page = None;
        plan.limit = Some(request.size.saturating_add(1));
        plan.offset = Some(u32::try_from(request.offset()).unwrap_or(u32::MAX));

        let (mut rows, _) = self.select_managed(&plan, params)?;
        let has_next = rows.len() > request.size as usize;
        rows.truncate(request.size as usize);

        Ok(Slice::new(rows, &request, has_next))
    }

    /// Filter an entity through a composed [`Spec`]; a fully absent
    /// composition matches every row.
    pub fn find_by_spec(&self, entity: &str, spec: Spec) -> Result<Response<Managed>, Error> {
        let mut plan = QueryPlan::new(entity, Subject::Find);
        plan.predicate = spec.resolve();
        let (rows, _) = self.select_managed(&plan, &Params::none())?;

        Ok(Response::new(entity, rows))
    }

    /// Parse a derived-name query against an entity and stage it here.
    pub fn derive(&self, entity: &str, name: &str) -> Result<Derived<'_>, Error> {
        let db = self.db();
        let plan = {
            let inner = db.inner.borrow();
            let desc = inner.registry.entity(entity)?;
            DerivedQuery::parse(&inner.registry, desc, name)?.into_plan(entity)
        };

        Ok(Derived {
            session: self,
            plan,
        })
    }

    /// Count matching rows without materialising them.
    pub fn count(&self, query: &Query, params: &Params) -> Result<u64, Error> {
        let plan = query.plan();
        expect_subject(plan, Subject::Count)?;

        self.count_plan(plan, params)
    }

    /// Whether any row matches; the scan stops at the first hit.
    pub fn exists(&self, query: &Query, params: &Params) -> Result<bool, Error> {
        let plan = query.plan();
        expect_subject(plan, Subject::Exists)?;

        self.exists_plan(plan, params)
    }

    /// Run a delete query now. Matching rows leave the store, undo
    /// logged and constraint checked, and any tracked state for them is
    /// dropped.
    pub fn delete_where(&self, query: &Query, params: &Params) -> Result<u64, Error> {
        let plan = query.plan();
        expect_subject(plan, Subject::Delete)?;

        self.delete_plan(plan, params)
    }

    /// Shape matching rows through a projection; rows stay untracked.
    pub fn project(
        &self,
        query: &Query,
        projection: &Projection,
        params: &Params,
    ) -> Result<Vec<ProjectionRow>, Error> {
        let plan = query.plan();
        expect_subject(plan, Subject::Find)?;
        let db = self.db();
        let inner = db.inner.borrow();
        let selection = Executor::new(&inner.registry, &inner.store).select(plan, params)?;
        let desc = inner.registry.entity(&plan.entity)?;
        let lookup = StoreLookup::new(&inner.store);

        selection
            .rows
            .iter()
            .map(|(_, row)| projection.project(&inner.registry, desc, row, &lookup))
            .collect()
    }

    /// Single-field projection straight to bare values.
    pub fn project_values(
        &self,
        query: &Query,
        field: &str,
        params: &Params,
    ) -> Result<Vec<Value>, Error> {
        let plan = query.plan();
        expect_subject(plan, Subject::Find)?;
        let db = self.db();
        let inner = db.inner.borrow();
        let selection = Executor::new(&inner.registry, &inner.store).select(plan, params)?;
        let slot = inner.registry.entity(&plan.entity)?.slot(field)?;

        Ok(selection
            .rows
            .into_iter()
            .map(|(_, row)| row.get(slot).cloned().unwrap_or(Value::Null))
            .collect())
    }

    /// Begin tracking a new record; it inserts at the next flush.
    pub fn add(&self, record: Record) -> Result<Managed, Error> {
        let state = &mut *self.state.borrow_mut();
        let db = state.db.clone();
        let inner = db.inner.borrow();
        let desc = inner.descriptor(record.entity())?;
        let weak = Rc::downgrade(&self.state);

        let managed = Managed::new(desc, record, weak);
        state.pending.push_back(managed.clone());

        Ok(managed)
    }

    /// Persist by state. A record that looks new queues for insert; the
    /// rest register as updates against the stored row. Newness follows
    /// the creation audit field when the entity declares one, otherwise
    /// an unset primary key.
    pub fn save(&self, record: Record) -> Result<Managed, Error> {
        let state = &mut *self.state.borrow_mut();
        let db = state.db.clone();
        let inner = db.inner.borrow();
        let desc = inner.descriptor(record.entity())?;
        let weak = Rc::downgrade(&self.state);

        if is_new(&desc, &record) {
            let managed = Managed::new(desc, record, weak);
            state.pending.push_back(managed.clone());
            return Ok(managed);
        }

        let key = record.key(&desc)?;
        let ident = (desc.name.clone(), key.clone());
        if let Some(existing) = state.identity.get(&ident) {
            *existing.cell.borrow_mut() = record;
            return Ok(existing.clone());
        }

        let snapshot = inner
            .store
            .get(&desc.name, &key)
            .cloned()
            .unwrap_or_else(|| Record::fresh(&desc));
        let managed = Managed::new(desc, record, weak);
        state.snapshots.insert(ident.clone(), snapshot);
        state.identity.insert(ident, managed.clone());

        Ok(managed)
    }

    /// Schedule a managed record for deletion at the next flush. A
    /// still-queued insert is simply unqueued.
    pub fn remove(&self, managed: &Managed) -> Result<(), Error> {
        let state = &mut *self.state.borrow_mut();

        if let Some(at) = state
            .pending
            .iter()
            .position(|queued| Rc::ptr_eq(&queued.cell, &managed.cell))
        {
            state.pending.remove(at);
            return Ok(());
        }

        let key = managed.key()?;
        state
            .removals
            .insert((managed.entity_name().to_string(), key));

        Ok(())
    }

    /// Apply a bulk statement straight to the store, bypassing tracking,
    /// hooks, and version stamping. Constraints still hold and every
    /// write is undo logged. Managed cells of affected rows refresh or
    /// stay stale per the session's invalidation option.
    pub fn execute(&self, bulk: &Bulk, params: &Params) -> Result<u64, Error> {
        let state = &mut *self.state.borrow_mut();
        let db = state.db.clone();
        let inner = &mut *db.inner.borrow_mut();

        match bulk.op() {
            BulkOp::Update if bulk.sets().is_empty() => {
                return Err(QueryError::BulkNoSets {
                    entity: bulk.entity().to_string(),
                }
                .into());
            }
            BulkOp::Delete if !bulk.sets().is_empty() => {
                return Err(QueryError::BulkSetsOnDelete {
                    entity: bulk.entity().to_string(),
                }
                .into());
            }
            _ => {}
        }

        let Inner {
            registry, store, ..
        } = inner;
        let desc = registry.entity(bulk.entity())?;

        for (field, set) in bulk.sets() {
            let slot = desc.slot(field)?;
            if matches!(set, BulkSet::AddInt(_)) {
                let kind = desc.fields[slot].kind;
                if !matches!(kind, FieldKind::Int | FieldKind::Uint) {
                    return Err(QueryError::TypeMismatch {
                        entity: desc.name.clone(),
                        field: field.clone(),
                        expected: kind,
                        found: "int delta",
                    }
                    .into());
                }
            }
        }

        let bound = BoundPredicate::bind(registry, desc, bulk.predicate(), params)?;
        let matched: Vec<Key> = {
            let lookup = StoreLookup::new(store);
            store
                .scan(&desc.name)
                .filter(|(_, row)| bound.eval(row, &lookup))
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut affected = 0_u64;
        for key in &matched {
            match bulk.op() {
                BulkOp::Delete => {
                    store.delete(registry, desc, key, &mut state.tx)?;
                }
                BulkOp::Update => {
                    let Some(mut row) = store.get(&desc.name, key).cloned() else {
                        continue;
                    };
                    for (field, set) in bulk.sets() {
                        let slot = desc.slot(field)?;
                        let current = row.get(slot).cloned().unwrap_or(Value::Null);
                        let Some(next) = set.apply(&current) else {
                            return Err(QueryError::BulkArithmetic {
                                entity: desc.name.clone(),
                                field: field.clone(),
                            }
                            .into());
                        };
                        row.set(desc, field, next)?;
                    }
                    store.update(desc, row, &mut state.tx)?;
                }
            }
            affected += 1;
        }

        let mut invalidated = 0_u64;
        if matches!(state.options.invalidation, BulkInvalidation::EvictAffected) {
            for key in &matched {
                let ident = (desc.name.clone(), key.clone());
                match bulk.op() {
                    BulkOp::Delete => {
                        if state.identity.remove(&ident).is_some() {
                            invalidated += 1;
                        }
                        state.snapshots.remove(&ident);
                        state.removals.remove(&ident);
                    }
                    BulkOp::Update => {
                        if let Some(managed) = state.identity.get(&ident)
                            && let Some(row) = store.get(&desc.name, key)
                        {
                            *managed.cell.borrow_mut() = row.clone();
                            state.snapshots.insert(ident.clone(), row.clone());
                            invalidated += 1;
                        }
                    }
                }
            }
        }

        record(MetricsEvent::BulkApplied {
            entity: bulk.entity(),
            op: bulk.op(),
            affected,
            invalidated,
        });

        Ok(affected)
    }

    /// Register an extra before-insert hook for this session.
    pub fn on_insert(&self, hook: impl Fn(&EntityDescriptor, &mut Record, Timestamp) + 'static) {
        self.state.borrow_mut().hooks.on_insert(hook);
    }

    /// Register an extra before-update hook for this session.
    pub fn on_update(&self, hook: impl Fn(&EntityDescriptor, &mut Record, Timestamp) + 'static) {
        self.state.borrow_mut().hooks.on_update(hook);
    }

    /// Push tracked changes to the store without ending the unit of
    /// work: queued inserts, then dirty updates, then scheduled
    /// removals. A failed flush leaves the remaining work queued.
    pub fn flush(&self) -> Result<(), Error> {
        let state = &mut *self.state.borrow_mut();
        let db = state.db.clone();
        let inner = &mut *db.inner.borrow_mut();

        Self::run_flush(state, inner)
    }

    /// End the unit of work: flush, retire the undo log, release locks.
    /// On failure the session is consumed and rolls back on drop.
    pub fn commit(self) -> Result<(), Error> {
        let state = &mut *self.state.borrow_mut();
        let db = state.db.clone();
        let inner = &mut *db.inner.borrow_mut();

        Self::run_flush(state, inner)?;
        state.tx.commit();
        inner.locks.release_session(state.id);
        state.closed = true;

        Ok(())
    }

    /// Abandon the unit of work: store writes unwind in reverse order
    /// and held locks release.
    pub fn rollback(self) {
        let state = &mut *self.state.borrow_mut();
        if !state.closed {
            Self::run_rollback(state);
        }
    }

    pub(crate) fn select_managed(
        &self,
        plan: &QueryPlan,
        params: &Params,
    ) -> Result<(Vec<Managed>, Option<u64>), Error> {
        let (db, id, attempts) = {
            let state = self.state.borrow();
            (state.db.clone(), state.id, state.options.lock_attempts)
        };

        let selection = {
            let inner = db.inner.borrow();
            Executor::new(&inner.registry, &inner.store).select(plan, params)?
        };

        if plan.hints.lock.is_some() {
            let inner = &mut *db.inner.borrow_mut();
            for (key, _) in &selection.rows {
                let outcome = inner.locks.acquire(&plan.entity, key, id, attempts);
                record(MetricsEvent::LockWait {
                    entity: &plan.entity,
                    acquired: outcome.is_ok(),
                });
                outcome?;
            }
        }

        let weak = Rc::downgrade(&self.state);
        let state = &mut *self.state.borrow_mut();
        let inner = db.inner.borrow();
        let mut rows = Vec::with_capacity(selection.rows.len());
        for (key, row) in selection.rows {
            let managed = if plan.hints.read_only {
                state::untracked(&inner, &weak, &plan.entity, row, &plan.hints.fetch)?
            } else {
                state.track(&inner, &weak, &plan.entity, key, row, &plan.hints.fetch)?
            };
            rows.push(managed);
        }

        Ok((rows, selection.total))
    }

    pub(crate) fn count_plan(&self, plan: &QueryPlan, params: &Params) -> Result<u64, Error> {
        let db = self.db();
        let inner = db.inner.borrow();

        Executor::new(&inner.registry, &inner.store).count(plan, params)
    }

    pub(crate) fn exists_plan(&self, plan: &QueryPlan, params: &Params) -> Result<bool, Error> {
        let db = self.db();
        let inner = db.inner.borrow();

        Executor::new(&inner.registry, &inner.store).exists(plan, params)
    }

    pub(crate) fn delete_plan(&self, plan: &QueryPlan, params: &Params) -> Result<u64, Error> {
        let state = &mut *self.state.borrow_mut();
        let db = state.db.clone();
        let inner = &mut *db.inner.borrow_mut();

        let selection = Executor::new(&inner.registry, &inner.store).select(plan, params)?;

        let Inner {
            registry, store, ..
        } = inner;
        let desc = registry.entity(&plan.entity)?;
        let mut affected = 0_u64;
        for (key, _) in &selection.rows {
            store.delete(registry, desc, key, &mut state.tx)?;
            let ident = (plan.entity.clone(), key.clone());
            state.identity.remove(&ident);
            state.snapshots.remove(&ident);
            state.removals.remove(&ident);
            affected += 1;
        }

        Ok(affected)
    }

    fn db(&self) -> Database {
        self.state.borrow().db.clone()
    }

    fn run_flush(state: &mut SessionState, inner: &mut Inner) -> Result<(), Error> {
        let now = inner.clock.now();
        let mut inserts = 0_u64;
        let mut updates = 0_u64;
        let mut deletes = 0_u64;

        while let Some(managed) = state.pending.front().cloned() {
            let desc = Rc::clone(&managed.entity);
            {
                let mut row = managed.cell.borrow_mut();
                if desc.generated_id && row.id_value(&desc).is_null() {
                    let id = inner.store.next_id(&desc.name);
                    row.set_slot(desc.id_slot, Value::Uint(id));
                }
                state.hooks.run_insert(&desc, &mut row, now);
                if let Some(slot) = desc.version_slot
                    && row.get(slot).is_none_or(Value::is_null)
                {
                    row.set_slot(slot, Value::Uint(1));
                }
            }

            let row = managed.cell.borrow().clone();
            let key = inner.store.insert(&desc, row.clone(), &mut state.tx)?;
            let ident = (desc.name.clone(), key);
            state.snapshots.insert(ident.clone(), row);
            state.identity.insert(ident, managed);
            state.pending.pop_front();
            inserts += 1;
        }

        let dirty: Vec<(String, Key)> = state
            .identity
            .iter()
            .filter(|(ident, managed)| {
                state
                    .snapshots
                    .get(ident)
                    .is_none_or(|snapshot| *snapshot != *managed.cell.borrow())
            })
            .map(|(ident, _)| ident.clone())
            .collect();

        for ident in dirty {
            let Some(managed) = state.identity.get(&ident).cloned() else {
                continue;
            };
            let desc = Rc::clone(&managed.entity);
            let (entity, key) = &ident;
            {
                let mut row = managed.cell.borrow_mut();
                state.hooks.run_update(&desc, &mut row, now);
                if let Some(slot) = desc.version_slot {
                    let found = inner.store.get(entity, key).and_then(|r| r.version(&desc));
                    let expected = row.version(&desc);
                    if let (Some(expected), Some(found)) = (expected, found) {
                        if expected != found {
                            return Err(SessionError::StaleWrite {
                                entity: entity.clone(),
                                key: key.clone(),
                                expected,
                                found,
                            }
                            .into());
                        }
                        row.set_slot(slot, Value::Uint(found + 1));
                    }
                }
            }

            let row = managed.cell.borrow().clone();
            inner.store.update(&desc, row.clone(), &mut state.tx)?;
            state.snapshots.insert(ident, row);
            updates += 1;
        }

        let scheduled: Vec<(String, Key)> = state.removals.iter().cloned().collect();
        for ident in scheduled {
            let (entity, key) = &ident;
            let desc = inner.registry.entity(entity)?;
            inner.store.delete(&inner.registry, desc, key, &mut state.tx)?;
            state.identity.remove(&ident);
            state.snapshots.remove(&ident);
            state.removals.remove(&ident);
            deletes += 1;
        }

        record(MetricsEvent::FlushStats {
            inserts,
            updates,
            deletes,
        });

        Ok(())
    }

    fn run_rollback(state: &mut SessionState) {
        let db = state.db.clone();
        let inner = &mut *db.inner.borrow_mut();
        let Inner {
            registry,
            store,
            locks,
            ..
        } = inner;

        state.tx.rollback(registry, store);
        locks.release_session(state.id);
        state.identity.clear();
        state.snapshots.clear();
        state.pending.clear();
        state.removals.clear();
        state.closed = true;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("Session")
                .field("id", &state.id)
                .field("tracked", &state.identity.len())
                .field("pending", &state.pending.len())
                .finish_non_exhaustive(),
            Err(_) => f.debug_struct("Session").finish_non_exhaustive(),
        }
    }
}

impl Drop for Session {
    /// An unfinished unit of work rolls back.
    fn drop(&mut self) {
        let state = &mut *self.state.borrow_mut();
        if !state.closed {
            Self::run_rollback(state);
        }
    }
}

pub(crate) fn expect_subject(plan: &QueryPlan, expected: Subject) -> Result<(), Error> {
    if plan.subject == expected {
        Ok(())
    } else {
        Err(QueryError::SubjectMismatch {
            expected,
            found: plan.subject,
        }
        .into())
    }
}

fn is_new(desc: &EntityDescriptor, record: &Record) -> bool {
    if let Some(slot) = desc.created_at_slot {
        return record.get(slot).is_none_or(Value::is_null);
    }

    record.id_value(desc).is_null()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::Registry, query::Predicate, types::ManualClock};

    fn team_desc() -> EntityDescriptor {
        EntityDescriptor::build("team")
            .generated_id("id")
            .unique("name", FieldKind::Text)
            .finish()
            .expect("team should build")
    }

    fn member_desc() -> EntityDescriptor {
        EntityDescriptor::build("member")
            .generated_id("id")
            .unique("username", FieldKind::Text)
            .field("age", FieldKind::Int)
            .nullable("team_id", FieldKind::Uint)
            .relation("team", "team", "team_id")
            .finish()
            .expect("member should build")
    }

    fn item_desc() -> EntityDescriptor {
        EntityDescriptor::build("item")
            .generated_id("id")
            .field("label", FieldKind::Text)
            .version("version")
            .created_at("created_at")
            .updated_at("updated_at")
            .finish()
            .expect("item should build")
    }

    fn schema() -> Registry {
        let mut registry = Registry::new();
        for desc in [team_desc(), member_desc(), item_desc()] {
            registry.register(desc).expect("entity should register");
        }

        registry
    }

    fn open() -> (Database, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let db = Database::with_clock(schema(), clock.clone()).expect("database should open");

        (db, clock)
    }

    fn member(username: &str, age: i64) -> Record {
        Record::build(&member_desc())
            .set("username", username)
            .set("age", age)
            .build()
            .expect("member record should build")
    }

    fn item(label: &str) -> Record {
        Record::build(&item_desc())
            .set("label", label)
            .build()
            .expect("item record should build")
    }

    fn seed_members(db: &Database, ages: &[i64]) {
        let session = db.session();
        for (i, age) in ages.iter().enumerate() {
            session
                .add(member(&format!("m{i}"), *age))
                .expect("member should queue");
        }
        session.commit().expect("seed should commit");
    }

    #[test]
    fn add_then_flush_assigns_generated_ids() {
        let (db, _) = open();
        let session = db.session();

        let kit = session.add(member("kit", 20)).expect("add should queue");
        let nia = session.add(member("nia", 30)).expect("add should queue");
        assert!(kit.key().is_err(), "id should be unset before flush");

        session.flush().expect("flush should succeed");
        assert_eq!(kit.key().expect("id should be set"), Key::Uint(1));
        assert_eq!(nia.key().expect("id should be set"), Key::Uint(2));
        assert_eq!(db.row_count("member"), 2);
    }

    #[test]
    fn save_routes_by_newness() {
        let (db, _) = open();
        let session = db.session();

        // no creation audit field: new means unset id
        session.save(member("kit", 20)).expect("save should queue");
        session.flush().expect("insert should flush");
        assert_eq!(db.row_count("member"), 1);

        // id set: an update, and the row must exist
        let mut stray = member("nia", 30);
        stray
            .set(&member_desc(), "id", 77_u64)
            .expect("id should write");
        session.save(stray).expect("save should register");
        let err = session.flush().expect_err("updating a missing row should fail");
        assert!(err.is_not_found());
    }

    #[test]
    fn save_treats_stamped_created_at_as_old() {
        let (db, clock) = open();
        let session = db.session();

        let mut stamped = item("widget");
        stamped
            .set(&item_desc(), "id", 9_u64)
            .expect("id should write");
        stamped
            .set(&item_desc(), "version", 1_u64)
            .expect("version should write");
        stamped
            .set(&item_desc(), "created_at", clock.now())
            .expect("created_at should write");

        session.save(stamped).expect("save should register");
        let err = session.flush().expect_err("no stored row to update");
        assert!(err.is_not_found());
    }

    #[test]
    fn identity_map_reuses_cells() {
        let (db, _) = open();
        seed_members(&db, &[20]);

        let session = db.session();
        let by_get = session
            .get("member", 1_u64)
            .expect("get should succeed")
            .expect("row should exist");
        let by_find = session
            .find(&Query::find("member"), &Params::none())
            .expect("find should succeed")
            .one()
            .expect("exactly one row");

        assert!(Rc::ptr_eq(&by_get.cell, &by_find.cell));

        by_get.set("age", 21_i64).expect("age should write");
        assert_eq!(
            by_find.get("age").expect("age should read"),
            Value::Int(21),
            "edits should be visible through every handle"
        );
    }

    #[test]
    fn clean_records_do_not_flush_again() {
        let (db, _) = open();
        seed_members(&db, &[20]);

        let session = db.session();
        let row = session
            .get("member", 1_u64)
            .expect("get should succeed")
            .expect("row should exist");

        row.set("age", 25_i64).expect("age should write");
        session.flush().expect("dirty flush should succeed");
        let logged = session.state.borrow().tx.len();

        session.flush().expect("clean flush should succeed");
        assert_eq!(
            session.state.borrow().tx.len(),
            logged,
            "a clean record should not write again"
        );

        row.set("age", 40_i64).expect("age should write");
        row.set("age", 25_i64).expect("age should write back");
        session.flush().expect("reverted flush should succeed");
        assert_eq!(
            session.state.borrow().tx.len(),
            logged,
            "a field set back to its loaded value leaves the record clean"
        );
    }

    #[test]
    fn audit_and_version_stamping_follow_the_clock() {
        let (db, clock) = open();
        let session = db.session();
        let t0 = clock.now();

        let row = session.add(item("widget")).expect("add should queue");
        session.flush().expect("insert should flush");
        assert_eq!(row.version(), Some(1));
        assert_eq!(row.get("created_at").expect("created_at"), Value::Timestamp(t0));
        assert_eq!(row.get("updated_at").expect("updated_at"), Value::Timestamp(t0));

        clock.advance_millis(500);
        let t1 = clock.now();
        row.set("label", "gadget").expect("label should write");
        session.flush().expect("update should flush");

        assert_eq!(row.version(), Some(2));
        assert_eq!(row.get("created_at").expect("created_at"), Value::Timestamp(t0));
        assert_eq!(row.get("updated_at").expect("updated_at"), Value::Timestamp(t1));
    }

    #[test]
    fn stale_write_is_detected_across_sessions() {
        let (db, _) = open();
        {
            let session = db.session();
            session.add(item("widget")).expect("add should queue");
            session.commit().expect("seed should commit");
        }

        let loser = db.session();
        let held = loser
            .get("item", 1_u64)
            .expect("get should succeed")
            .expect("row should exist");

        {
            let winner = db.session();
            let row = winner
                .get("item", 1_u64)
                .expect("get should succeed")
                .expect("row should exist");
            row.set("label", "fast").expect("label should write");
            winner.commit().expect("winner should commit");
        }

        held.set("label", "slow").expect("label should write");
        let err = loser.flush().expect_err("conflicting write should fail");
        assert!(matches!(
            err,
            Error::Session(SessionError::StaleWrite {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn uncommitted_work_rolls_back_on_drop() {
        let (db, _) = open();
        {
            let session = db.session();
            session.add(member("kit", 20)).expect("add should queue");
            session.flush().expect("flush should succeed");
            assert_eq!(db.row_count("member"), 1);
        }

        assert_eq!(db.row_count("member"), 0, "drop should undo the insert");
    }

    #[test]
    fn rollback_restores_overwritten_rows() {
        let (db, _) = open();
        seed_members(&db, &[20]);

        let session = db.session();
        let row = session
            .get("member", 1_u64)
            .expect("get should succeed")
            .expect("row should exist");
        row.set("age", 99_i64).expect("age should write");
        session.flush().expect("flush should succeed");
        session.rollback();

        let check = db.session();
        let row = check
            .get("member", 1_u64)
            .expect("get should succeed")
            .expect("row should exist");
        assert_eq!(row.get("age").expect("age should read"), Value::Int(20));
    }

    #[test]
    fn remove_schedules_deletion() {
        let (db, _) = open();
        seed_members(&db, &[20, 30]);

        let session = db.session();
        let row = session
            .get("member", 1_u64)
            .expect("get should succeed")
            .expect("row should exist");
        session.remove(&row).expect("remove should schedule");
        assert_eq!(db.row_count("member"), 2, "removal waits for flush");

        session.flush().expect("flush should succeed");
        assert_eq!(db.row_count("member"), 1);
    }

    #[test]
    fn removing_a_queued_insert_just_unqueues_it() {
        let (db, _) = open();
        let session = db.session();

        let queued = session.add(member("kit", 20)).expect("add should queue");
        session.remove(&queued).expect("remove should unqueue");
        session.flush().expect("flush should succeed");

        assert_eq!(db.row_count("member"), 0);
    }

    #[test]
    fn delete_where_runs_immediately() {
        let (db, _) = open();
        seed_members(&db, &[10, 20, 30]);

        let session = db.session();
        let affected = session
            .delete_where(
                &Query::delete("member").filter(Predicate::gte("age", 20)),
                &Params::none(),
            )
            .expect("delete should run");

        assert_eq!(affected, 2);
        assert_eq!(db.row_count("member"), 1, "store changes before any flush");
    }

    #[test]
    fn read_only_rows_are_never_flushed() {
        let (db, _) = open();
        seed_members(&db, &[20]);

        let session = db.session();
        let row = session
            .find(&Query::find("member").read_only(), &Params::none())
            .expect("find should succeed")
            .one()
            .expect("exactly one row");

        row.set("age", 99_i64).expect("detached edit should write");
        session.flush().expect("flush should succeed");

        let check = db.session();
        let stored = check
            .get("member", 1_u64)
            .expect("get should succeed")
            .expect("row should exist");
        assert_eq!(
            stored.get("age").expect("age should read"),
            Value::Int(20),
            "read-only edits must not persist"
        );
    }

    #[test]
    fn subject_mismatch_is_rejected() {
        let (db, _) = open();
        let session = db.session();

        let err = session
            .find(&Query::count("member"), &Params::none())
            .expect_err("count plan should not find");
        assert!(matches!(
            err,
            Error::Query(QueryError::SubjectMismatch { .. })
        ));
    }
}
