use crate::{store::StoreError, value::Key};
use derive_more::Display;
use std::collections::{BTreeMap, BTreeSet};

///
/// SessionId
/// Monotonic id issued by the database handle when a session opens.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

///
/// LockTable
///
/// Exclusive (entity, key) locks owned by sessions. A lock outlives
/// nothing: closing or dropping the owning session releases it, and a
/// lock left behind by a dead session is reaped on first contact.
///

#[derive(Debug, Default)]
pub struct LockTable {
    locks: BTreeMap<(String, Key), SessionId>,
    live: BTreeSet<SessionId>,
}

impl LockTable {
    /// Mark a session live so its locks are honoured.
    pub fn register(&mut self, session: SessionId) {
        self.live.insert(session);
    }

    /// Take the lock, retrying up to `attempts` times while another live
    /// session holds it. Re-acquiring an owned lock always succeeds.
    pub fn acquire(
        &mut self,
        entity: &str,
        key: &Key,
        session: SessionId,
        attempts: u32,
    ) -> Result<(), StoreError> {
        let slot = (entity.to_string(), key.clone());
        let mut remaining = attempts;

        loop {
            let holder = self.locks.get(&slot).copied();
            match holder {
                None => {
                    self.locks.insert(slot, session);
                    return Ok(());
                }
                Some(owner) if owner == session => return Ok(()),
                Some(owner) if !self.live.contains(&owner) => {
                    self.locks.insert(slot, session);
                    return Ok(());
                }
                Some(owner) => {
                    if remaining == 0 {
                        return Err(StoreError::LockTimeout {
                            entity: entity.to_string(),
                            key: key.clone(),
                            owner,
                        });
                    }
                    remaining -= 1;
                }
            }
        }
    }

    /// Drop every lock the session holds and forget its liveness.
    pub fn release_session(&mut self, session: SessionId) {
        self.locks.retain(|_, owner| *owner != session);
        self.live.remove(&session);
    }

    #[must_use]
    pub fn holder(&self, entity: &str, key: &Key) -> Option<SessionId> {
        self.locks.get(&(entity.to_string(), key.clone())).copied()
    }

    #[must_use]
    pub fn held_count(&self, session: SessionId) -> usize {
        self.locks.values().filter(|owner| **owner == session).count()
    }
}
