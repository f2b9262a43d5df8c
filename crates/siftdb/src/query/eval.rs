use crate::{
    Error,
    model::{EntityDescriptor, FieldKind, RelatedRef, Registry},
    query::{
        plan::QueryError,
        predicate::{CompareOp, FieldRef, Operand, Params, Predicate},
    },
    record::Record,
    value::{Key, TextMode, Value},
};
use std::cmp::Ordering;

///
/// RelatedLookup
///
/// Seam through which bound predicates and projections read the target
/// of a relation path. The executor backs this with the live store.
///

pub trait RelatedLookup {
    fn related(&self, entity: &str, key: &Key) -> Option<Record>;
}

/// Lookup for contexts with no relation access (pure in-memory checks).
pub(crate) struct NoRelated;

impl RelatedLookup for NoRelated {
    fn related(&self, _entity: &str, _key: &Key) -> Option<Record> {
        None
    }
}

///
/// BoundRef
/// A field reference resolved to slots.
///

#[derive(Clone, Debug)]
pub(crate) enum BoundRef {
    Local { slot: usize },
    Related(RelatedRef),
}

impl BoundRef {
    /// Read the referenced value for one record. Missing targets and
    /// null foreign keys read as `Null`, which predicate semantics then
    /// treat like any other null.
    pub(crate) fn read(&self, record: &Record, lookup: &dyn RelatedLookup) -> Value {
        match self {
            Self::Local { slot } => record.get(*slot).cloned().unwrap_or(Value::Null),
            Self::Related(related) => {
                let fk = record.get(related.fk_slot).cloned().unwrap_or(Value::Null);
                let Ok(key) = Key::try_from(fk) else {
                    return Value::Null;
                };

                lookup
                    .related(&related.target, &key)
                    .and_then(|target| target.get(related.target_slot).cloned())
                    .unwrap_or(Value::Null)
            }
        }
    }
}

/// Resolve a field reference against the registry; returns the bound ref
/// together with the declared kind of the referenced field.
pub(crate) fn bind_ref(
    registry: &Registry,
    entity: &EntityDescriptor,
    field: &FieldRef,
) -> Result<(BoundRef, FieldKind), Error> {
    match field {
        FieldRef::Field(name) => {
            let slot = entity.slot(name)?;

            Ok((BoundRef::Local { slot }, entity.fields[slot].kind))
        }
        FieldRef::Related { relation, field } => {
            let related = registry.resolve_related(&entity.name, relation, field)?;
            let kind = related.target_kind;

            Ok((BoundRef::Related(related), kind))
        }
    }
}

///
/// BoundCompare
///

#[derive(Clone, Debug)]
pub(crate) struct BoundCompare {
    field: BoundRef,
    op: CompareOp,
    value: Value,
    mode: TextMode,
}

///
/// BoundPredicate
///
/// Predicate with placeholders substituted and every field reference
/// resolved to slots. Built once per execution; evaluation is per row.
///

#[derive(Clone, Debug)]
pub(crate) enum BoundPredicate {
    True,
    False,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(BoundCompare),
    IsNull(BoundRef),
    IsNotNull(BoundRef),
}

impl BoundPredicate {
    /// Verify arity, substitute placeholders, resolve slots, and check
    /// operand kinds. Everything a row does not need happens here.
    pub(crate) fn bind(
        registry: &Registry,
        entity: &EntityDescriptor,
        predicate: &Predicate,
        params: &Params,
    ) -> Result<Self, Error> {
        check_params(predicate, params)?;

        Self::bind_inner(registry, entity, predicate, params)
    }

    fn bind_inner(
        registry: &Registry,
        entity: &EntityDescriptor,
        predicate: &Predicate,
        params: &Params,
    ) -> Result<Self, Error> {
        let bound = match predicate {
            Predicate::True => Self::True,
            Predicate::False => Self::False,
            Predicate::And(preds) => Self::And(
                preds
                    .iter()
                    .map(|p| Self::bind_inner(registry, entity, p, params))
                    .collect::<Result<_, _>>()?,
            ),
            Predicate::Or(preds) => Self::Or(
                preds
                    .iter()
                    .map(|p| Self::bind_inner(registry, entity, p, params))
                    .collect::<Result<_, _>>()?,
            ),
            Predicate::Not(pred) => Self::Not(Box::new(Self::bind_inner(
                registry, entity, pred, params,
            )?)),
            Predicate::IsNull { field } => {
                let (bound_ref, _) = bind_ref(registry, entity, field)?;
                Self::IsNull(bound_ref)
            }
            Predicate::IsNotNull { field } => {
                let (bound_ref, _) = bind_ref(registry, entity, field)?;
                Self::IsNotNull(bound_ref)
            }
            Predicate::Compare(cmp) => {
                let (bound_ref, kind) = bind_ref(registry, entity, &cmp.field)?;
                let value = substitute(&cmp.operand, params)?;
                check_operand(entity, &cmp.field, cmp.op, cmp.mode, kind, &value)?;

                Self::Compare(BoundCompare {
                    field: bound_ref,
                    op: cmp.op,
                    value,
                    mode: cmp.mode,
                })
            }
        };

        Ok(bound)
    }

    /// Row evaluation. Null comparisons are false except IS NULL;
    /// `And([])` is true and `Or([])` is false.
    pub(crate) fn eval(&self, record: &Record, lookup: &dyn RelatedLookup) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::And(preds) => preds.iter().all(|p| p.eval(record, lookup)),
            Self::Or(preds) => preds.iter().any(|p| p.eval(record, lookup)),
            Self::Not(pred) => !pred.eval(record, lookup),
            Self::IsNull(field) => field.read(record, lookup).is_null(),
            Self::IsNotNull(field) => !field.read(record, lookup).is_null(),
            Self::Compare(cmp) => cmp.eval(record, lookup),
        }
    }
}

impl BoundCompare {
    fn eval(&self, record: &Record, lookup: &dyn RelatedLookup) -> bool {
        let lhs = self.field.read(record, lookup);

        match self.op {
            CompareOp::In => match &self.value {
                Value::List(candidates) => {
                    !lhs.is_null() && candidates.iter().any(|c| *c == lhs)
                }
                _ => false,
            },
            CompareOp::NotIn => match &self.value {
                Value::List(candidates) => {
                    !lhs.is_null() && !candidates.iter().any(|c| *c == lhs)
                }
                _ => false,
            },
            CompareOp::Contains => lhs
                .text_op(&self.value, self.mode, |a, b| a.contains(b))
                .unwrap_or(false),
            CompareOp::StartsWith => lhs
                .text_op(&self.value, self.mode, |a, b| a.starts_with(b))
                .unwrap_or(false),
            CompareOp::EndsWith => lhs
                .text_op(&self.value, self.mode, |a, b| a.ends_with(b))
                .unwrap_or(false),
            CompareOp::Eq | CompareOp::Ne => {
                if lhs.is_null() || self.value.is_null() {
                    return false;
                }
                let eq = match self.mode {
                    TextMode::Ci => lhs
                        .text_op(&self.value, TextMode::Ci, |a, b| a == b)
                        .unwrap_or(lhs == self.value),
                    TextMode::Cs => lhs == self.value,
                };
                if matches!(self.op, CompareOp::Eq) { eq } else { !eq }
            }
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
                if lhs.is_null() || self.value.is_null() {
                    return false;
                }
                let ord = lhs.cmp(&self.value);
                match self.op {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Lte => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }
            }
        }
    }
}

/// Substitute a placeholder operand from the parameter set.
fn substitute(operand: &Operand, params: &Params) -> Result<Value, Error> {
    match operand {
        Operand::Value(value) => Ok(value.clone()),
        Operand::Param(index) => params.positional_at(*index).cloned().ok_or_else(|| {
            QueryError::PositionalArity {
                expected: index + 1,
                found: params.positional_len(),
            }
            .into()
        }),
        Operand::Named(name) => params
            .named_value(name)
            .cloned()
            .ok_or_else(|| QueryError::MissingNamed { name: name.clone() }.into()),
    }
}

/// Exact-arity verification before any row is visited.
fn check_params(predicate: &Predicate, params: &Params) -> Result<(), Error> {
    let expected = predicate.param_count();
    let found = params.positional_len();
    if expected != found {
        return Err(QueryError::PositionalArity { expected, found }.into());
    }

    let mut used = Vec::new();
    predicate.named_params(&mut used);
    for name in &used {
        if params.named_value(name).is_none() {
            return Err(QueryError::MissingNamed { name: name.clone() }.into());
        }
    }
    for name in params.named_keys() {
        if !used.iter().any(|n| n == name) {
            return Err(QueryError::UnusedNamed {
                name: name.to_string(),
            }
            .into());
        }
    }

    Ok(())
}

/// Operand kind checks. Null operands pass binding and fail every row.
fn check_operand(
    entity: &EntityDescriptor,
    field: &FieldRef,
    op: CompareOp,
    mode: TextMode,
    kind: FieldKind,
    value: &Value,
) -> Result<(), Error> {
    if op.is_text() || mode == TextMode::Ci {
        if kind != FieldKind::Text {
            return Err(QueryError::TextOpOnNonText {
                entity: entity.name.clone(),
                field: field.to_string(),
            }
            .into());
        }
        if !value.is_null() && value.as_text().is_none() {
            return Err(QueryError::TypeMismatch {
                entity: entity.name.clone(),
                field: field.to_string(),
                expected: kind,
                found: value.kind_name(),
            }
            .into());
        }

        return Ok(());
    }

    if op.is_membership() {
        let Value::List(candidates) = value else {
            return Err(QueryError::InListExpected {
                field: field.to_string(),
            }
            .into());
        };
        for candidate in candidates {
            if !candidate.is_null() && !kind.matches(candidate) {
                return Err(QueryError::TypeMismatch {
                    entity: entity.name.clone(),
                    field: field.to_string(),
                    expected: kind,
                    found: candidate.kind_name(),
                }
                .into());
            }
        }

        return Ok(());
    }

    if !value.is_null() && !kind.matches(value) {
        return Err(QueryError::TypeMismatch {
            entity: entity.name.clone(),
            field: field.to_string(),
            expected: kind,
            found: value.kind_name(),
        }
        .into());
    }

    Ok(())
}
