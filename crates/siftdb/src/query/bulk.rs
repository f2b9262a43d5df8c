use crate::{query::predicate::Predicate, value::Value};
use serde::{Deserialize, Serialize};

///
/// BulkOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[remain::sorted]
pub enum BulkOp {
    Delete,
    Update,
}

///
/// BulkSet
///
/// One field assignment in a bulk update. `To` overwrites, `AddInt`
/// shifts an integer field by a signed delta (null stays null).
///

#[derive(Clone, Debug, PartialEq)]
#[remain::sorted]
pub enum BulkSet {
    AddInt(i64),
    To(Value),
}

impl BulkSet {
    /// Next value for a slot, given its current value. `None` means the
    /// delta left the field's integer range.
    #[must_use]
    pub(crate) fn apply(&self, current: &Value) -> Option<Value> {
        match self {
            Self::To(value) => Some(value.clone()),
            Self::AddInt(delta) => match current {
                Value::Null => Some(Value::Null),
                Value::Int(i) => i.checked_add(*delta).map(Value::Int),
                Value::Uint(u) => u.checked_add_signed(*delta).map(Value::Uint),
                _ => None,
            },
        }
    }
}

///
/// BulkInvalidation
///
/// What happens to identity-mapped rows a bulk statement touched.
/// Evicting forces the next read to see the written state; keeping
/// leaves tracked rows at their pre-statement values.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[remain::sorted]
pub enum BulkInvalidation {
    #[default]
    EvictAffected,
    Keep,
}

///
/// Bulk
///
/// A set-oriented update or delete applied straight to stored rows.
/// Bulk statements skip lifecycle hooks, version bumps and dirty
/// tracking; constraints still hold.
///

#[derive(Clone, Debug)]
pub struct Bulk {
    entity: String,
    op: BulkOp,
    sets: Vec<(String, BulkSet)>,
    predicate: Predicate,
}

impl Bulk {
    #[must_use]
    pub fn update(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            op: BulkOp::Update,
            sets: Vec::new(),
            predicate: Predicate::True,
        }
    }

    #[must_use]
    pub fn delete(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            op: BulkOp::Delete,
            sets: Vec::new(),
            predicate: Predicate::True,
        }
    }

    /// Overwrite a field on every matched row.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((field.into(), BulkSet::To(value.into())));
        self
    }

    /// Shift an integer field on every matched row.
    #[must_use]
    pub fn add_int(mut self, field: impl Into<String>, delta: i64) -> Self {
        self.sets.push((field.into(), BulkSet::AddInt(delta)));
        self
    }

    /// Restrict the statement; an unfiltered bulk touches every row.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub const fn op(&self) -> BulkOp {
        self.op
    }

    #[must_use]
    pub fn sets(&self) -> &[(String, BulkSet)] {
        &self.sets
    }

    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.predicate.param_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::{CompareOp, Operand};

    #[test]
    fn update_collects_sets_and_filter() {
        let bulk = Bulk::update("member")
            .add_int("age", 1)
            .filter(Predicate::cmp("age", CompareOp::Lt, Operand::param(0)));

        assert_eq!(bulk.op(), BulkOp::Update);
        assert_eq!(bulk.entity(), "member");
        assert_eq!(bulk.sets().len(), 1);
        assert_eq!(bulk.param_count(), 1);
    }

    #[test]
    fn delete_defaults_to_all_rows() {
        let bulk = Bulk::delete("member");
        assert_eq!(bulk.op(), BulkOp::Delete);
        assert!(bulk.sets().is_empty());
        assert_eq!(*bulk.predicate(), Predicate::True);
    }

    #[test]
    fn add_int_shifts_within_range() {
        let set = BulkSet::AddInt(1);
        assert_eq!(set.apply(&Value::Int(20)), Some(Value::Int(21)));
        assert_eq!(set.apply(&Value::Uint(20)), Some(Value::Uint(21)));
        assert_eq!(set.apply(&Value::Null), Some(Value::Null), "null stays null");

        let down = BulkSet::AddInt(-1);
        assert_eq!(down.apply(&Value::Uint(0)), None, "uint cannot go negative");
    }

    #[test]
    fn to_overwrites_regardless_of_current() {
        let set = BulkSet::To(Value::from("zed"));
        assert_eq!(set.apply(&Value::from("kit")), Some(Value::from("zed")));
        assert_eq!(set.apply(&Value::Null), Some(Value::from("zed")));
    }
}
