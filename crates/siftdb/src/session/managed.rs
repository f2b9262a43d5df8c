use crate::{
    error::Error,
    model::EntityDescriptor,
    record::Record,
    session::{SessionError, state::SessionRef},
    value::{Key, Value},
};
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

///
/// Managed
///
/// A record in the hands of a session: a shared cell every load of the
/// same key resolves to, plus a per-record relation cache. Handles are
/// cheap to clone and stay readable after their session ends; only cold
/// lazy relation loads need the session alive.
///

#[derive(Clone)]
pub struct Managed {
    pub(crate) entity: Rc<EntityDescriptor>,
    pub(crate) cell: Rc<RefCell<Record>>,
    pub(crate) session: SessionRef,
    pub(crate) relations: Rc<RefCell<BTreeMap<String, Managed>>>,
}

impl Managed {
    pub(crate) fn new(entity: Rc<EntityDescriptor>, record: Record, session: SessionRef) -> Self {
        Self {
            entity,
            cell: Rc::new(RefCell::new(record)),
            session,
            relations: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity.name
    }

    /// Current value of one field.
    pub fn get(&self, field: &str) -> Result<Value, Error> {
        let slot = self.entity.slot(field)?;
        let record = self.cell.borrow();

        Ok(record.get(slot).cloned().unwrap_or(Value::Null))
    }

    /// Write one field with kind and nullability checks. The write lands
    /// in the shared cell; a tracked record persists it at the next flush.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), Error> {
        self.cell.borrow_mut().set(&self.entity, field, value)
    }

    /// Primary key; fails while a generated id is still unassigned.
    pub fn key(&self) -> Result<Key, Error> {
        let record = self.cell.borrow();

        record.key(&self.entity).map_err(Error::from)
    }

    /// Optimistic version counter, when declared and stamped.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.cell.borrow().version(&self.entity)
    }

    /// Detached copy of the current record state.
    #[must_use]
    pub fn snapshot(&self) -> Record {
        self.cell.borrow().clone()
    }

    /// Whether the owning session is still alive.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.session.strong_count() > 0
    }

    /// Resolve a to-one relation. Eager targets and previously fetched
    /// lazy targets come from the cache; a cold lazy load goes through
    /// the owning session and fails as detached once that session is
    /// gone. A null foreign key resolves to `None`.
    pub fn fetch(&self, relation: &str) -> Result<Option<Self>, Error> {
        let rel = self.entity.relation(relation)?;
        if let Some(cached) = self.relations.borrow().get(relation) {
            return Ok(Some(cached.clone()));
        }

        let slot = self.entity.slot(&rel.fk_field)?;
        let fk = self.cell.borrow().get(slot).cloned().unwrap_or(Value::Null);
        let Ok(target_key) = Key::try_from(fk) else {
            return Ok(None);
        };

        let Some(state) = self.session.upgrade() else {
            return Err(SessionError::DetachedFetch {
                entity: self.entity.name.clone(),
                relation: relation.to_string(),
            }
            .into());
        };

        let state = &mut *state.borrow_mut();
        let db = state.db.clone();
        let inner = db.inner.borrow();
        let Some(row) = inner.store.get(&rel.target, &target_key).cloned() else {
            return Ok(None);
        };
        let target = state.track(&inner, &self.session, &rel.target, target_key, row, &[])?;
        self.cache(relation, target.clone());

        Ok(Some(target))
    }

    pub(crate) fn has_cached(&self, relation: &str) -> bool {
        self.relations.borrow().contains_key(relation)
    }

    pub(crate) fn cache(&self, relation: &str, target: Self) {
        self.relations
            .borrow_mut()
            .insert(relation.to_string(), target);
    }
}

impl fmt::Debug for Managed {
    /// Relation caches can be cyclic, so they are elided here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("entity", &self.entity.name)
            .field("record", &*self.cell.borrow())
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;
    use std::rc::Weak;

    fn member() -> Rc<EntityDescriptor> {
        Rc::new(
            EntityDescriptor::build("member")
                .generated_id("id")
                .field("username", FieldKind::Text)
                .nullable("team_id", FieldKind::Uint)
                .relation("team", "team", "team_id")
                .finish()
                .expect("member should build"),
        )
    }

    fn detached(desc: &Rc<EntityDescriptor>) -> Managed {
        Managed::new(Rc::clone(desc), Record::fresh(desc), Weak::new())
    }

    #[test]
    fn get_and_set_enforce_the_descriptor() {
        let desc = member();
        let managed = detached(&desc);

        managed.set("username", "kit").expect("text should write");
        assert_eq!(
            managed.get("username").expect("username should read"),
            Value::Text("kit".into())
        );

        let err = managed
            .set("username", 7_i64)
            .expect_err("kind mismatch should fail");
        assert!(matches!(err, Error::Record(_)));
    }

    #[test]
    fn cold_lazy_fetch_without_a_session_is_detached() {
        let desc = member();
        let managed = detached(&desc);
        managed.set("team_id", 3_u64).expect("fk should write");

        let err = managed.fetch("team").expect_err("detached fetch should fail");
        assert!(matches!(err, Error::Session(SessionError::DetachedFetch { .. })));
    }

    #[test]
    fn null_foreign_key_resolves_to_none() {
        let desc = member();
        let managed = detached(&desc);

        let target = managed.fetch("team").expect("null fk should not error");
        assert!(target.is_none());
    }

    #[test]
    fn cached_relation_outlives_the_session() {
        let desc = member();
        let managed = detached(&desc);
        managed.set("team_id", 3_u64).expect("fk should write");

        let team = Rc::new(
            EntityDescriptor::build("team")
                .generated_id("id")
                .field("name", FieldKind::Text)
                .finish()
                .expect("team should build"),
        );
        let target = Managed::new(Rc::clone(&team), Record::fresh(&team), Weak::new());
        managed.cache("team", target);

        let target = managed
            .fetch("team")
            .expect("cached fetch should not error")
            .expect("cached target should be present");
        assert!(!target.is_attached());
    }
}
