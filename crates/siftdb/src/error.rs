use crate::{
    model::RegistryError,
    query::{DeriveError, QueryError, ResponseError},
    record::RecordError,
    session::SessionError,
    store::StoreError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Top-level error surface. Every fallible public operation funnels into
/// this enum; callers branch on [`ErrorClass`] rather than matching
/// message strings.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum Error {
    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Derive(err) => err.class(),
            Self::Query(err) => err.class(),
            Self::Record(err) => err.class(),
            Self::Registry(err) => err.class(),
            Self::Response(err) => err.class(),
            Self::Session(err) => err.class(),
            Self::Store(err) => err.class(),
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Derive(_) => ErrorOrigin::Derive,
            Self::Query(_) => ErrorOrigin::Query,
            Self::Record(_) => ErrorOrigin::Record,
            Self::Registry(_) => ErrorOrigin::Registry,
            Self::Response(_) => ErrorOrigin::Response,
            Self::Session(_) => ErrorOrigin::Session,
            Self::Store(_) => ErrorOrigin::Store,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class(), ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self.class(), ErrorClass::Constraint)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {self}", self.origin(), self.class())
    }
}

///
/// ErrorClass
/// Failure taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorClass {
    /// Placeholder/argument count or name mismatch.
    Arity,
    /// Unique or foreign-key constraint violation.
    Constraint,
    /// Lazy access through a closed session.
    Detached,
    /// Engine bug; should not be reachable from the public API.
    Internal,
    /// Pessimistic lock wait budget exhausted.
    Lock,
    NotFound,
    NotUnique,
    /// Derived method name could not be parsed.
    Parse,
    /// Unknown entity/field/relation or value-kind mismatch.
    Schema,
    /// Optimistic version conflict.
    Stale,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Arity => "arity",
            Self::Constraint => "constraint",
            Self::Detached => "detached",
            Self::Internal => "internal",
            Self::Lock => "lock",
            Self::NotFound => "not_found",
            Self::NotUnique => "not_unique",
            Self::Parse => "parse",
            Self::Schema => "schema",
            Self::Stale => "stale",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Subsystem that raised the error.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorOrigin {
    Derive,
    Query,
    Record,
    Registry,
    Response,
    Session,
    Store,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Derive => "derive",
            Self::Query => "query",
            Self::Record => "record",
            Self::Registry => "registry",
            Self::Response => "response",
            Self::Session => "session",
            Self::Store => "store",
        };
        write!(f, "{label}")
    }
}
