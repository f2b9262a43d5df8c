use crate::{
    error::Error,
    record::Record,
    session::{
        database::{Database, Inner, SessionOptions},
        hooks::Hooks,
        managed::Managed,
    },
    store::{SessionId, TxLog},
    value::Key,
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, VecDeque},
    rc::{Rc, Weak},
};

/// Weak handle a managed record keeps to its owning unit of work.
pub(crate) type SessionRef = Weak<RefCell<SessionState>>;

///
/// SessionState
///
/// Unit-of-work state behind the session handle: the identity map,
/// load-time snapshots for dirty checks, queued inserts and removals,
/// hooks, and the undo log. Managed records reach back here through a
/// weak reference, so lazy loads work exactly as long as the session
/// lives.
///

pub(crate) struct SessionState {
    pub db: Database,
    pub id: SessionId,
    pub options: SessionOptions,
    pub identity: BTreeMap<(String, Key), Managed>,
    pub snapshots: BTreeMap<(String, Key), Record>,
    pub pending: VecDeque<Managed>,
    pub removals: BTreeSet<(String, Key)>,
    pub hooks: Hooks,
    pub tx: TxLog,
    pub closed: bool,
}

impl SessionState {
    pub fn new(db: Database, id: SessionId, options: SessionOptions) -> Self {
        Self {
            db,
            id,
            options,
            identity: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            pending: VecDeque::new(),
            removals: BTreeSet::new(),
            hooks: Hooks::standard(),
            tx: TxLog::default(),
            closed: false,
        }
    }

    /// Enroll a loaded row, reusing the existing cell when the key is
    /// already managed; the store row is ignored on a hit so in-session
    /// edits survive re-loads. Eager relations resolve through the
    /// identity map, which also terminates relation cycles.
    pub fn track(
        &mut self,
        inner: &Inner,
        weak: &SessionRef,
        entity: &str,
        key: Key,
        record: Record,
        fetch: &[String],
    ) -> Result<Managed, Error> {
        let ident = (entity.to_string(), key);
        if let Some(existing) = self.identity.get(&ident).cloned() {
            if !fetch.is_empty() {
                self.resolve_relations(inner, weak, &existing, fetch)?;
            }
            return Ok(existing);
        }

        let desc = inner.descriptor(entity)?;
        let managed = Managed::new(desc, record.clone(), weak.clone());
        self.snapshots.insert(ident.clone(), record);
        self.identity.insert(ident, managed.clone());
        self.resolve_relations(inner, weak, &managed, fetch)?;

        Ok(managed)
    }

    /// Resolve eager relations, plus any fetch hints, into the managed
    /// record's relation cache. Cached names are left alone.
    pub fn resolve_relations(
        &mut self,
        inner: &Inner,
        weak: &SessionRef,
        managed: &Managed,
        fetch: &[String],
    ) -> Result<(), Error> {
        let desc = Rc::clone(&managed.entity);
        for rel in &desc.relations {
            if !rel.is_eager() && !fetch.iter().any(|f| f == &rel.name) {
                continue;
            }
            if managed.has_cached(&rel.name) {
                continue;
            }
            let slot = desc.slot(&rel.fk_field)?;
            let fk = managed.cell.borrow().get(slot).cloned();
            let Some(fk) = fk else { continue };
            let Ok(target_key) = Key::try_from(fk) else {
                continue;
            };
            let Some(row) = inner.store.get(&rel.target, &target_key).cloned() else {
                continue;
            };
            let target = self.track(inner, weak, &rel.target, target_key, row, &[])?;
            managed.cache(&rel.name, target);
        }

        Ok(())
    }
}

/// Materialise a row outside the unit of work: no identity cell, no
/// snapshot, never flushed. Eager targets come back one level deep,
/// equally untracked.
pub(crate) fn untracked(
    inner: &Inner,
    weak: &SessionRef,
    entity: &str,
    record: Record,
    fetch: &[String],
) -> Result<Managed, Error> {
    let desc = inner.descriptor(entity)?;
    let managed = Managed::new(Rc::clone(&desc), record, weak.clone());

    for rel in &desc.relations {
        if !rel.is_eager() && !fetch.iter().any(|f| f == &rel.name) {
            continue;
        }
        let slot = desc.slot(&rel.fk_field)?;
        let fk = managed.cell.borrow().get(slot).cloned();
        let Some(fk) = fk else { continue };
        let Ok(target_key) = Key::try_from(fk) else { continue };
        let Some(row) = inner.store.get(&rel.target, &target_key) else {
            continue;
        };
        let target_desc = inner.descriptor(&rel.target)?;
        managed.cache(&rel.name, Managed::new(target_desc, row.clone(), weak.clone()));
    }

    Ok(managed)
}
