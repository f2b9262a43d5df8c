use crate::query::{
    page::{Direction, PageRequest},
    plan::{LockMode, QueryPlan, Subject},
    predicate::{FieldRef, Predicate},
};

///
/// Query
///
/// Typed builder for explicit queries, the counterpart to derived method
/// names when a query outgrows what a name can say. Staged onto a
/// [`QueryPlan`]; binding and validation happen at execution.
///

#[derive(Clone, Debug)]
pub struct Query {
    plan: QueryPlan,
}

impl Query {
    #[must_use]
    pub fn find(entity: impl Into<String>) -> Self {
        Self {
            plan: QueryPlan::new(entity, Subject::Find),
        }
    }

    #[must_use]
    pub fn count(entity: impl Into<String>) -> Self {
        Self {
            plan: QueryPlan::new(entity, Subject::Count),
        }
    }

    #[must_use]
    pub fn exists(entity: impl Into<String>) -> Self {
        Self {
            plan: QueryPlan::new(entity, Subject::Exists),
        }
    }

    #[must_use]
    pub fn delete(entity: impl Into<String>) -> Self {
        Self {
            plan: QueryPlan::new(entity, Subject::Delete),
        }
    }

    /// Set the predicate, replacing whatever was staged before.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.plan.predicate = predicate;
        self
    }

    /// AND another predicate onto the staged one.
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.plan.predicate = match self.plan.predicate {
            Predicate::True => predicate,
            staged => staged & predicate,
        };
        self
    }

    /// OR another predicate onto the staged one.
    #[must_use]
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.plan.predicate = match self.plan.predicate {
            Predicate::True => predicate,
            staged => staged | predicate,
        };
        self
    }

    /// Append a sort key; earlier keys dominate.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<FieldRef>, direction: Direction) -> Self {
        self.plan.order = self.plan.order.and(field, direction);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.plan.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u32) -> Self {
        self.plan.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.plan.distinct = true;
        self
    }

    /// Rows come back detached; no snapshots, no dirty checking.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.plan.hints.read_only = true;
        self
    }

    /// Acquire per-record write locks on every surviving row.
    #[must_use]
    pub fn lock(mut self) -> Self {
        self.plan.hints.lock = Some(LockMode::Pessimistic);
        self
    }

    /// Eager-fetch a relation for this query regardless of the
    /// descriptor's fetch mode.
    #[must_use]
    pub fn fetch(mut self, relation: impl Into<String>) -> Self {
        self.plan.hints.fetch.push(relation.into());
        self
    }

    #[must_use]
    pub fn page(mut self, request: PageRequest) -> Self {
        self.plan.page = Some(request);
        self
    }

    #[must_use]
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    #[must_use]
    pub fn into_plan(self) -> QueryPlan {
        self.plan
    }
}

impl From<Query> for QueryPlan {
    fn from(query: Query) -> Self {
        query.plan
    }
}
