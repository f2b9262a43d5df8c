use crate::{
    Error,
    model::{EntityDescriptor, Registry},
    query::eval::{BoundRef, RelatedLookup},
    record::Record,
    value::Value,
};
use std::{fmt, rc::Rc};

///
/// ProjectionField
///
/// One projected column: a local field, a one-level relation path, or a
/// computed column evaluated against the whole record (the open form).
///

#[derive(Clone)]
pub enum ProjectionField {
    Field(String),
    Related { relation: String, field: String },
    Computed {
        name: String,
        compute: Rc<dyn Fn(&Record, &dyn RelatedLookup) -> Value>,
    },
}

impl fmt::Debug for ProjectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Self::Related { relation, field } => f
                .debug_struct("Related")
                .field("relation", relation)
                .field("field", field)
                .finish(),
            Self::Computed { name, .. } => f.debug_struct("Computed").field("name", name).finish(),
        }
    }
}

///
/// Projection
///
/// Ordered column list applied to query results. Projected rows are
/// plain values: never tracked, never snapshotted, never locked.
///

#[derive(Clone, Debug, Default)]
pub struct Projection {
    fields: Vec<ProjectionField>,
}

impl Projection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(ProjectionField::Field(name.into()));
        self
    }

    #[must_use]
    pub fn related(mut self, relation: impl Into<String>, field: impl Into<String>) -> Self {
        self.fields.push(ProjectionField::Related {
            relation: relation.into(),
            field: field.into(),
        });
        self
    }

    /// Computed column over the full record (open projection).
    #[must_use]
    pub fn computed(
        mut self,
        name: impl Into<String>,
        compute: impl Fn(&Record, &dyn RelatedLookup) -> Value + 'static,
    ) -> Self {
        self.fields.push(ProjectionField::Computed {
            name: name.into(),
            compute: Rc::new(compute),
        });
        self
    }

    /// Open projections carry at least one computed column.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f, ProjectionField::Computed { .. }))
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.fields.len()
    }

    /// Apply to one record.
    pub(crate) fn project(
        &self,
        registry: &Registry,
        entity: &EntityDescriptor,
        record: &Record,
        lookup: &dyn RelatedLookup,
    ) -> Result<ProjectionRow, Error> {
        let mut columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match field {
                ProjectionField::Field(name) => {
                    let slot = entity.slot(name)?;
                    let value = record.get(slot).cloned().unwrap_or(Value::Null);
                    columns.push((name.clone(), value));
                }
                ProjectionField::Related { relation, field } => {
                    let related = registry.resolve_related(&entity.name, relation, field)?;
                    let bound = BoundRef::Related(related);
                    columns.push((format!("{relation}.{field}"), bound.read(record, lookup)));
                }
                ProjectionField::Computed { name, compute } => {
                    columns.push((name.clone(), compute(record, lookup)));
                }
            }
        }

        Ok(ProjectionRow { columns })
    }
}

///
/// ProjectionRow
/// Ordered (column, value) pairs with by-name access.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectionRow {
    columns: Vec<(String, Value)>,
}

impl ProjectionRow {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<(String, Value)> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::FieldKind, query::eval::NoRelated};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                EntityDescriptor::build("member")
                    .generated_id("id")
                    .field("username", FieldKind::Text)
                    .field("age", FieldKind::Int)
                    .finish()
                    .expect("member should build"),
            )
            .expect("member should register");
        registry
    }

    #[test]
    fn closed_projection_extracts_named_slots() {
        let registry = registry();
        let desc = registry.entity("member").expect("member should resolve");
        let record = Record::build(desc)
            .set("id", 1u64)
            .set("username", "kit")
            .set("age", 20)
            .build()
            .expect("record should build");

        let projection = Projection::new().field("username");
        assert!(!projection.is_open());

        let row = projection
            .project(&registry, desc, &record, &NoRelated)
            .expect("projection should apply");
        assert_eq!(row.get("username"), Some(&Value::from("kit")));
        assert_eq!(row.get("age"), None, "unprojected columns stay out");
    }

    #[test]
    fn computed_column_sees_the_full_record() {
        let registry = registry();
        let desc = registry.entity("member").expect("member should resolve");
        let record = Record::build(desc)
            .set("id", 1u64)
            .set("username", "kit")
            .set("age", 20)
            .build()
            .expect("record should build");

        let projection = Projection::new().computed("label", |record, _| {
            let name = record.get(1).and_then(Value::as_text).unwrap_or_default();
            let age = record.get(2).and_then(Value::as_int).unwrap_or_default();
            Value::from(format!("{name} {age}"))
        });
        assert!(projection.is_open());

        let row = projection
            .project(&registry, desc, &record, &NoRelated)
            .expect("projection should apply");
        assert_eq!(row.get("label"), Some(&Value::from("kit 20")));
    }

    #[test]
    fn unknown_projection_field_is_rejected() {
        let registry = registry();
        let desc = registry.entity("member").expect("member should resolve");
        let record = Record::fresh(desc);

        let err = Projection::new()
            .field("nickname")
            .project(&registry, desc, &record, &NoRelated)
            .expect_err("unknown column should fail");
        assert!(matches!(err, Error::Registry(_)));
    }
}
