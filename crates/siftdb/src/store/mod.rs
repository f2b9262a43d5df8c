pub mod data;
pub mod lock;
pub mod tx;

pub use data::DataStore;
pub use lock::{LockTable, SessionId};
pub use tx::TxLog;

use crate::{
    error::ErrorClass,
    value::{Key, Value},
};
use thiserror::Error as ThisError;

///
/// StoreError
///
/// Write-time failures. Constraint checks run before any mutation, so a
/// failed write leaves the row untouched.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum StoreError {
    #[error("{entity}.{field} references missing {target} row {key}")]
    ForeignKeyMissing {
        entity: String,
        field: String,
        target: String,
        key: Key,
    },

    #[error("{entity} row {key} is still referenced by {referrer}.{field}")]
    ForeignKeyRestrict {
        entity: String,
        key: Key,
        referrer: String,
        field: String,
    },

    #[error("{entity} row {key} already exists")]
    KeyExists { entity: String, key: Key },

    #[error("lock on {entity} row {key} held by session {owner}")]
    LockTimeout {
        entity: String,
        key: Key,
        owner: SessionId,
    },

    #[error("{entity} row {key} not found")]
    NotFound { entity: String, key: Key },

    #[error("{entity}.{field} already holds {value}")]
    UniqueViolation {
        entity: String,
        field: String,
        value: Value,
    },
}

impl StoreError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::ForeignKeyMissing { .. }
            | Self::ForeignKeyRestrict { .. }
            | Self::KeyExists { .. }
            | Self::UniqueViolation { .. } => ErrorClass::Constraint,
            Self::LockTimeout { .. } => ErrorClass::Lock,
            Self::NotFound { .. } => ErrorClass::NotFound,
        }
    }
}
