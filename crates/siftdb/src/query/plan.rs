use crate::{
    error::ErrorClass,
    model::FieldKind,
    query::{
        page::{PageRequest, Sort},
        predicate::Predicate,
    },
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

///
/// QueryError
///
/// Binding and shape errors raised when a plan meets a descriptor and a
/// parameter set.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum QueryError {
    #[error("bulk arithmetic overflowed on {entity}.{field}")]
    BulkArithmetic { entity: String, field: String },

    #[error("bulk update on {entity} has no set clauses")]
    BulkNoSets { entity: String },

    #[error("bulk delete on {entity} does not take set clauses")]
    BulkSetsOnDelete { entity: String },

    #[error("IN/NOT IN operand for {field} must be a list")]
    InListExpected { field: String },

    #[error("limit must be at least 1")]
    LimitZero,

    #[error("missing named parameter: {name}")]
    MissingNamed { name: String },

    #[error("{subject} queries do not take an ordering")]
    OrderNotAllowed { subject: Subject },

    #[error("{subject} queries do not take a page request")]
    PageNotAllowed { subject: Subject },

    #[error("expected {expected} positional parameters, got {found}")]
    PositionalArity { expected: usize, found: usize },

    #[error("expected a {expected} query, found {found}")]
    SubjectMismatch { expected: Subject, found: Subject },

    #[error("text operator on non-text field {entity}.{field}")]
    TextOpOnNonText { entity: String, field: String },

    #[error("{entity}.{field} expects {expected}, predicate supplies {found}")]
    TypeMismatch {
        entity: String,
        field: String,
        expected: FieldKind,
        found: &'static str,
    },

    #[error("named parameter is never referenced: {name}")]
    UnusedNamed { name: String },
}

impl QueryError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::BulkArithmetic { .. } => ErrorClass::Constraint,
            Self::MissingNamed { .. }
            | Self::PositionalArity { .. }
            | Self::UnusedNamed { .. } => ErrorClass::Arity,
            _ => ErrorClass::Schema,
        }
    }
}

///
/// Subject
/// What a query produces.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[remain::sorted]
pub enum Subject {
    Count,
    Delete,
    Exists,
    Find,
}

impl Subject {
    /// Whether this subject materialises record rows.
    #[must_use]
    pub const fn yields_rows(self) -> bool {
        matches!(self, Self::Find)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Count => "count",
            Self::Delete => "delete",
            Self::Exists => "exists",
            Self::Find => "find",
        };
        write!(f, "{label}")
    }
}

///
/// LockMode
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum LockMode {
    /// Per-record write locks acquired during execution, held to the end
    /// of the owning session.
    Pessimistic,
}

///
/// QueryHints
///
/// Execution modifiers carried beside the plan. None of them change
/// which rows match; they change how matched rows come back.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct QueryHints {
    /// Rows are returned detached and never snapshotted for dirty checks.
    pub read_only: bool,
    /// Lock surviving rows before shaping.
    pub lock: Option<LockMode>,
    /// Relations to eager-fetch for this query regardless of descriptor
    /// fetch mode.
    pub fetch: Vec<String>,
}

///
/// QueryPlan
///
/// Fully staged query, ready for the executor: what to produce, over
/// which entity, filtered, ordered, and windowed how.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QueryPlan {
    pub entity: String,
    pub subject: Subject,
    pub predicate: Predicate,
    pub order: Sort,
    pub page: Option<PageRequest>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub distinct: bool,
    pub hints: QueryHints,
}

impl QueryPlan {
    #[must_use]
    pub fn new(entity: impl Into<String>, subject: Subject) -> Self {
        Self {
            entity: entity.into(),
            subject,
            predicate: Predicate::True,
            order: Sort::none(),
            page: None,
            limit: None,
            offset: None,
            distinct: false,
            hints: QueryHints::default(),
        }
    }

    /// Positional placeholder arity of the staged predicate.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.predicate.param_count()
    }

    /// Structural checks that need no descriptor: subjects that never
    /// materialise rows take no ordering or page window.
    pub fn check_shape(&self) -> Result<(), QueryError> {
        if self.limit == Some(0) {
            return Err(QueryError::LimitZero);
        }

        match self.subject {
            Subject::Find => {}
            Subject::Delete => {
                if self.page.is_some() {
                    return Err(QueryError::PageNotAllowed {
                        subject: self.subject,
                    });
                }
            }
            Subject::Count | Subject::Exists => {
                if !self.order.is_empty() {
                    return Err(QueryError::OrderNotAllowed {
                        subject: self.subject,
                    });
                }
                if self.page.is_some() {
                    return Err(QueryError::PageNotAllowed {
                        subject: self.subject,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::page::Direction;

    #[test]
    fn count_rejects_ordering() {
        let mut plan = QueryPlan::new("member", Subject::Count);
        plan.order = Sort::by("age", Direction::Asc);

        let err = plan.check_shape().expect_err("count with order should fail");
        assert!(matches!(err, QueryError::OrderNotAllowed { .. }));
    }

    #[test]
    fn delete_rejects_page_window() {
        let mut plan = QueryPlan::new("member", Subject::Delete);
        plan.page = Some(PageRequest::of(0, 10));

        let err = plan.check_shape().expect_err("delete with page should fail");
        assert!(matches!(err, QueryError::PageNotAllowed { .. }));
    }

    #[test]
    fn find_accepts_order_and_page() {
        let mut plan = QueryPlan::new("member", Subject::Find);
        plan.order = Sort::by("age", Direction::Desc);
        plan.page = Some(PageRequest::of(1, 3));

        plan.check_shape().expect("find shape should pass");
    }

    #[test]
    fn zero_limit_is_rejected() {
        let mut plan = QueryPlan::new("member", Subject::Find);
        plan.limit = Some(0);

        let err = plan.check_shape().expect_err("zero limit should fail");
        assert!(matches!(err, QueryError::LimitZero));
    }
}
