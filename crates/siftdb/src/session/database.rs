use crate::{
    error::Error,
    model::{EntityDescriptor, Registry, RegistryError},
    query::BulkInvalidation,
    session::Session,
    store::{DataStore, LockTable, SessionId},
    types::{Clock, SystemClock},
};
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

///
/// Database
///
/// Shared embedded state: validated schema, row stores, the lock table,
/// and the clock audit hooks stamp from. Cloning hands out another
/// handle to the same state; all access goes through sessions.
///

#[derive(Clone)]
pub struct Database {
    pub(crate) inner: Rc<RefCell<Inner>>,
}

impl Database {
    /// Validate the schema and open an empty database over it, stamping
    /// audit fields from the system clock.
    pub fn new(registry: Registry) -> Result<Self, Error> {
        Self::with_clock(registry, Rc::new(SystemClock))
    }

    /// Open with an injected time source so tests can pin time.
    pub fn with_clock(registry: Registry, clock: Rc<dyn Clock>) -> Result<Self, Error> {
        registry.validate()?;

        let descriptors = registry
            .entities()
            .map(|desc| (desc.name.clone(), Rc::new(desc.clone())))
            .collect();
        let store = DataStore::new(&registry);

        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                registry,
                descriptors,
                store,
                locks: LockTable::default(),
                clock,
                next_session: 0,
            })),
        })
    }

    /// Begin a unit of work with default options.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session_with(SessionOptions::default())
    }

    /// Begin a unit of work with explicit options.
    #[must_use]
    pub fn session_with(&self, options: SessionOptions) -> Session {
        let id = {
            let inner = &mut *self.inner.borrow_mut();
            inner.next_session += 1;
            let id = SessionId::new(inner.next_session);
            inner.locks.register(id);
            id
        };

        Session::begin(self.clone(), id, options)
    }

    /// Stored rows for one entity, committed or not yet rolled back.
    #[must_use]
    pub fn row_count(&self, entity: &str) -> usize {
        self.inner.borrow().store.row_count(entity)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

///
/// SessionOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionOptions {
    /// Extra acquisition attempts before a contended lock times out.
    pub lock_attempts: u32,
    /// How bulk statements treat managed cells of affected rows.
    pub invalidation: BulkInvalidation,
}

///
/// Inner
///
/// Single-threaded shared state behind every [`Database`] handle.
/// Sessions borrow it for the duration of one call, never across calls,
/// so nested units of work stay panic-free.
///

pub(crate) struct Inner {
    pub registry: Registry,
    pub descriptors: BTreeMap<String, Rc<EntityDescriptor>>,
    pub store: DataStore,
    pub locks: LockTable,
    pub clock: Rc<dyn Clock>,
    pub next_session: u64,
}

impl Inner {
    /// Shared descriptor handle for managed records.
    pub fn descriptor(&self, entity: &str) -> Result<Rc<EntityDescriptor>, Error> {
        self.descriptors.get(entity).cloned().ok_or_else(|| {
            RegistryError::EntityNotFound {
                entity: entity.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;

    fn schema() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                EntityDescriptor::build("team")
                    .generated_id("id")
                    .unique("name", FieldKind::Text)
                    .finish()
                    .expect("team should build"),
            )
            .expect("team should register");
        registry
            .register(
                EntityDescriptor::build("member")
                    .generated_id("id")
                    .unique("username", FieldKind::Text)
                    .field("age", FieldKind::Int)
                    .nullable("team_id", FieldKind::Uint)
                    .relation("team", "team", "team_id")
                    .finish()
                    .expect("member should build"),
            )
            .expect("member should register");

        registry
    }

    #[test]
    fn open_validates_the_schema() {
        let mut registry = Registry::new();
        registry
            .register(
                EntityDescriptor::build("member")
                    .generated_id("id")
                    .nullable("team_id", FieldKind::Uint)
                    .relation("team", "team", "team_id")
                    .finish()
                    .expect("member should build"),
            )
            .expect("member should register");

        let err = Database::new(registry).expect_err("dangling relation target should fail");
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let db = Database::new(schema()).expect("database should open");
        let first = db.session();
        let second = db.session();

        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn fresh_database_is_empty() {
        let db = Database::new(schema()).expect("database should open");
        assert_eq!(db.row_count("member"), 0);
        assert_eq!(db.row_count("team"), 0);
    }
}
