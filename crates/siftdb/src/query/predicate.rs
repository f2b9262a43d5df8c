use crate::value::{TextMode, Value};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    ops::{BitAnd, BitOr},
};

///
/// Predicate AST
///
/// Pure representation of query predicates over field names and relation
/// paths. This layer carries no slot resolution, type validation, or
/// execution semantics; binding happens once per execution in `eval`.
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[remain::sorted]
pub enum CompareOp {
    Contains,
    EndsWith,
    Eq,
    Gt,
    Gte,
    In,
    Lt,
    Lte,
    Ne,
    NotIn,
    StartsWith,
}

impl CompareOp {
    /// Whether the operand must be a text value and the field kind text.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }

    /// Whether the operand must be a list of candidate values.
    #[must_use]
    pub const fn is_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

///
/// FieldRef
///
/// A field reference in a predicate or sort key: either a local field or
/// a one-level relation path (`"team.name"`).
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FieldRef {
    Field(String),
    Related { relation: String, field: String },
}

impl FieldRef {
    /// Parse `"field"` or `"relation.field"`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('.') {
            Some((relation, field)) => Self::Related {
                relation: relation.to_string(),
                field: field.to_string(),
            },
            None => Self::Field(raw.to_string()),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for FieldRef {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Related { relation, field } => write!(f, "{relation}.{field}"),
        }
    }
}

///
/// Operand
///
/// Right-hand side of a comparison: a literal, a positional placeholder,
/// or a named placeholder. Placeholders substitute from [`Params`] at
/// bind time.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Operand {
    Value(Value),
    Param(usize),
    Named(String),
}

impl Operand {
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    #[must_use]
    pub const fn param(index: usize) -> Self {
        Self::Param(index)
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

///
/// ComparePredicate
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ComparePredicate {
    pub field: FieldRef,
    pub op: CompareOp,
    pub operand: Operand,
    pub mode: TextMode,
}

impl ComparePredicate {
    #[must_use]
    pub fn new(field: impl Into<FieldRef>, op: CompareOp, operand: Operand) -> Self {
        Self {
            field: field.into(),
            op,
            operand,
            mode: TextMode::Cs,
        }
    }

    /// Same comparison under case-insensitive text matching.
    #[must_use]
    pub const fn ignore_case(mut self) -> Self {
        self.mode = TextMode::Ci;
        self
    }
}

///
/// Predicate
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Predicate {
    True,
    False,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(ComparePredicate),
    IsNull { field: FieldRef },
    IsNotNull { field: FieldRef },
}

impl Predicate {
    #[must_use]
    pub const fn and(preds: Vec<Self>) -> Self {
        Self::And(preds)
    }

    #[must_use]
    pub const fn or(preds: Vec<Self>) -> Self {
        Self::Or(preds)
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(pred: Self) -> Self {
        Self::Not(Box::new(pred))
    }

    /// General comparison with an explicit operand.
    #[must_use]
    pub fn cmp(field: impl Into<FieldRef>, op: CompareOp, operand: Operand) -> Self {
        Self::Compare(ComparePredicate::new(field, op, operand))
    }

    #[must_use]
    pub fn eq(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::Eq, Operand::value(value))
    }

    #[must_use]
    pub fn ne(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::Ne, Operand::value(value))
    }

    #[must_use]
    pub fn lt(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::Lt, Operand::value(value))
    }

    #[must_use]
    pub fn lte(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::Lte, Operand::value(value))
    }

    #[must_use]
    pub fn gt(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::Gt, Operand::value(value))
    }

    #[must_use]
    pub fn gte(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::Gte, Operand::value(value))
    }

    #[must_use]
    pub fn in_(field: impl Into<FieldRef>, values: Vec<Value>) -> Self {
        Self::cmp(field, CompareOp::In, Operand::Value(Value::List(values)))
    }

    #[must_use]
    pub fn not_in(field: impl Into<FieldRef>, values: Vec<Value>) -> Self {
        Self::cmp(field, CompareOp::NotIn, Operand::Value(Value::List(values)))
    }

    #[must_use]
    pub fn contains(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::Contains, Operand::value(value))
    }

    #[must_use]
    pub fn starts_with(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::StartsWith, Operand::value(value))
    }

    #[must_use]
    pub fn ends_with(field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CompareOp::EndsWith, Operand::value(value))
    }

    #[must_use]
    pub fn is_null(field: impl Into<FieldRef>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn is_not_null(field: impl Into<FieldRef>) -> Self {
        Self::IsNotNull {
            field: field.into(),
        }
    }

    /// Highest positional placeholder index plus one, across the tree.
    #[must_use]
    pub fn param_count(&self) -> usize {
        match self {
            Self::True | Self::False | Self::IsNull { .. } | Self::IsNotNull { .. } => 0,
            Self::And(preds) | Self::Or(preds) => {
                preds.iter().map(Self::param_count).max().unwrap_or(0)
            }
            Self::Not(pred) => pred.param_count(),
            Self::Compare(cmp) => match cmp.operand {
                Operand::Param(i) => i + 1,
                Operand::Value(_) | Operand::Named(_) => 0,
            },
        }
    }

    /// Collect named placeholders referenced by the tree, in first-use order.
    pub(crate) fn named_params(&self, out: &mut Vec<String>) {
        match self {
            Self::True | Self::False | Self::IsNull { .. } | Self::IsNotNull { .. } => {}
            Self::And(preds) | Self::Or(preds) => {
                for pred in preds {
                    pred.named_params(out);
                }
            }
            Self::Not(pred) => pred.named_params(out),
            Self::Compare(cmp) => {
                if let Operand::Named(name) = &cmp.operand
                    && !out.iter().any(|n| n == name)
                {
                    out.push(name.clone());
                }
            }
        }
    }
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(vec![self, rhs])
    }
}

impl BitAnd for &Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Self) -> Self::Output {
        Predicate::And(vec![self.clone(), rhs.clone()])
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

impl BitOr for &Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Self) -> Self::Output {
        Predicate::Or(vec![self.clone(), rhs.clone()])
    }
}

///
/// Params
///
/// Arguments supplied at execution: positional values for
/// [`Operand::Param`] slots plus named values for [`Operand::Named`].
///

#[derive(Clone, Debug, Default)]
pub struct Params {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl Params {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }

    /// Append one positional value.
    #[must_use]
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Bind one named value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    #[must_use]
    pub fn positional_at(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    #[must_use]
    pub fn named_value(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    pub(crate) fn named_keys(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_ops_compose_predicates() {
        let pred = Predicate::eq("username", "kit") & Predicate::gt("age", 20);
        assert!(matches!(pred, Predicate::And(ref preds) if preds.len() == 2));

        let pred = pred | Predicate::is_null("team_id");
        assert!(matches!(pred, Predicate::Or(ref preds) if preds.len() == 2));
    }

    #[test]
    fn field_ref_parses_one_level_paths() {
        assert_eq!(FieldRef::parse("age"), FieldRef::Field("age".into()));
        assert_eq!(
            FieldRef::parse("team.name"),
            FieldRef::Related {
                relation: "team".into(),
                field: "name".into(),
            }
        );
    }

    #[test]
    fn param_count_spans_the_tree() {
        let pred = Predicate::cmp("a", CompareOp::Eq, Operand::param(0))
            & (Predicate::cmp("b", CompareOp::Gt, Operand::param(2))
                | Predicate::eq("c", "literal"));
        assert_eq!(pred.param_count(), 3, "highest index plus one");
    }

    #[test]
    fn named_params_collect_in_first_use_order() {
        let pred = Predicate::cmp("a", CompareOp::Eq, Operand::named("x"))
            & Predicate::cmp("b", CompareOp::Eq, Operand::named("y"))
            & Predicate::cmp("c", CompareOp::Eq, Operand::named("x"));

        let mut names = Vec::new();
        pred.named_params(&mut names);
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }
}
