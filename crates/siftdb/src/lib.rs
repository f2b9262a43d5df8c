//! Embedded data access layer: schema-validated record stores, derived
//! name queries, sessions with change tracking, and paged result shaping.

// public exports are one module level down, except the error surface
pub mod error;
pub mod model;
pub mod obs;
pub mod query;
pub mod record;
pub mod session;
pub mod store;
pub mod types;
pub mod value;

pub use error::Error;

///
/// Prelude
///
/// Domain vocabulary only. Errors, stores, executors, and observability
/// plumbing stay behind their modules.
///

pub mod prelude {
    pub use crate::{
        model::{EntityDescriptor, FieldKind, Registry},
        query::{Direction, PageRequest, Params, Predicate, Query, Sort, Spec},
        record::Record,
        session::{Database, Managed, Session, SessionOptions},
        value::{Key, Value},
    };
}
