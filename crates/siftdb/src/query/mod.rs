pub mod builder;
pub mod bulk;
pub mod derive;
pub mod eval;
pub mod executor;
pub mod page;
pub mod plan;
pub mod predicate;
pub mod projection;
pub mod response;
pub mod spec;

pub use builder::Query;
pub use bulk::{Bulk, BulkInvalidation, BulkOp, BulkSet};
pub use derive::{DeriveError, DerivedQuery};
pub use eval::RelatedLookup;
pub use page::{Direction, Page, PageRequest, Slice, Sort};
pub use plan::{LockMode, QueryError, QueryHints, QueryPlan, Subject};
pub use predicate::{CompareOp, ComparePredicate, FieldRef, Operand, Params, Predicate};
pub use projection::{Projection, ProjectionField, ProjectionRow};
pub use response::{Response, ResponseError};
pub use spec::Spec;
