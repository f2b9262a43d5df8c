use crate::model::{
    field::{FieldDescriptor, FieldKind},
    registry::RegistryError,
    relation::{FetchMode, RelationDescriptor},
};
use serde::{Deserialize, Serialize};

///
/// EntityDescriptor
///
/// Runtime model for one entity: ordered fields (authoritative for slot
/// layout), to-one relations, and role slots resolved at build time.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EntityDescriptor {
    /// Stable entity name used in stores, queries, and diagnostics.
    pub name: String,
    /// Ordered field list; slot indexes are positions in this list.
    pub fields: Vec<FieldDescriptor>,
    /// To-one relations.
    pub relations: Vec<RelationDescriptor>,
    /// Primary key slot.
    pub id_slot: usize,
    /// Optimistic-version slot, when declared.
    pub version_slot: Option<usize>,
    /// Creation audit slot, when declared.
    pub created_at_slot: Option<usize>,
    /// Update audit slot, when declared.
    pub updated_at_slot: Option<usize>,
    /// Whether primary keys are sequence-assigned on insert.
    pub generated_id: bool,
}

impl EntityDescriptor {
    #[must_use]
    pub fn build(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder::new(name)
    }

    #[must_use]
    pub const fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Resolve a field name to its slot index.
    pub fn slot(&self, field: &str) -> Result<usize, RegistryError> {
        self.fields
            .iter()
            .position(|f| f.name == field)
            .ok_or_else(|| RegistryError::FieldNotFound {
                entity: self.name.clone(),
                field: field.to_string(),
            })
    }

    pub fn field(&self, name: &str) -> Result<&FieldDescriptor, RegistryError> {
        self.slot(name).map(|slot| &self.fields[slot])
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    #[must_use]
    pub fn id_field(&self) -> &FieldDescriptor {
        &self.fields[self.id_slot]
    }

    pub fn relation(&self, name: &str) -> Result<&RelationDescriptor, RegistryError> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| RegistryError::RelationNotFound {
                entity: self.name.clone(),
                relation: name.to_string(),
            })
    }

    /// Slots carrying a unique index.
    pub fn unique_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.unique)
            .map(|(slot, _)| slot)
    }
}

///
/// EntityBuilder
///
/// Fluent descriptor construction. Field-level mistakes are collected and
/// reported at [`finish`](Self::finish) so chains stay infallible.
///

#[derive(Debug)]
pub struct EntityBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    relations: Vec<RelationDescriptor>,
    ids: Vec<String>,
    generated_id: bool,
    version: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl EntityBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
            ids: Vec::new(),
            generated_id: false,
            version: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn push(mut self, name: impl Into<String>, kind: FieldKind, nullable: bool, unique: bool) -> Self {
        let mut field = FieldDescriptor::new(name, kind);
        field.nullable = nullable;
        field.unique = unique;
        self.fields.push(field);
        self
    }

    /// Required (non-null) field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(name, kind, false, false)
    }

    /// Nullable field.
    #[must_use]
    pub fn nullable(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(name, kind, true, false)
    }

    /// Required field with a unique index.
    #[must_use]
    pub fn unique(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.push(name, kind, false, true)
    }

    /// Client-assigned primary key.
    #[must_use]
    pub fn id(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        self.ids.push(name.clone());
        self.push(name, kind, false, false)
    }

    /// Sequence-assigned `Uint` primary key.
    #[must_use]
    pub fn generated_id(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.ids.push(name.clone());
        self.generated_id = true;
        self.push(name, FieldKind::Uint, false, false)
    }

    /// Optimistic-lock version counter (`Uint`, stamped on flush).
    #[must_use]
    pub fn version(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.version = Some(name.clone());
        self.push(name, FieldKind::Uint, false, false)
    }

    /// Creation audit timestamp (nullable until first flush).
    #[must_use]
    pub fn created_at(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.created_at = Some(name.clone());
        self.push(name, FieldKind::Timestamp, true, false)
    }

    /// Update audit timestamp (nullable until first flush).
    #[must_use]
    pub fn updated_at(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.updated_at = Some(name.clone());
        self.push(name, FieldKind::Timestamp, true, false)
    }

    /// Lazy to-one relation; `fk_field` must name a declared field.
    #[must_use]
    pub fn relation(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        fk_field: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationDescriptor {
            name: name.into(),
            target: target.into(),
            fk_field: fk_field.into(),
            fetch: FetchMode::Lazy,
        });
        self
    }

    /// Eager to-one relation; resolved at load and cached.
    #[must_use]
    pub fn eager(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        fk_field: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationDescriptor {
            name: name.into(),
            target: target.into(),
            fk_field: fk_field.into(),
            fetch: FetchMode::Eager,
        });
        self
    }

    pub fn finish(self) -> Result<EntityDescriptor, RegistryError> {
        let entity = self.name;

        if self.fields.is_empty() {
            return Err(RegistryError::NoFields { entity });
        }

        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(RegistryError::DuplicateField {
                    entity,
                    field: field.name.clone(),
                });
            }
        }

        let id_name = match self.ids.as_slice() {
            [] => return Err(RegistryError::NoIdField { entity }),
            [one] => one,
            [_, second, ..] => {
                return Err(RegistryError::DuplicateId {
                    entity,
                    field: second.clone(),
                });
            }
        };

        let slot_of = |name: &str| {
            self.fields
                .iter()
                .position(|f| f.name == name)
                .unwrap_or_default()
        };

        let id_slot = slot_of(id_name);
        let id_kind = self.fields[id_slot].kind;
        if !id_kind.is_keyable() {
            return Err(RegistryError::IdNotKeyable {
                entity,
                field: id_name.clone(),
                kind: id_kind,
            });
        }

        for (i, rel) in self.relations.iter().enumerate() {
            if self.relations[..i].iter().any(|r| r.name == rel.name) {
                return Err(RegistryError::DuplicateRelation {
                    entity,
                    relation: rel.name.clone(),
                });
            }
            if self.fields.iter().any(|f| f.name == rel.name) {
                return Err(RegistryError::RelationNameClash {
                    entity,
                    relation: rel.name.clone(),
                });
            }
            if !self.fields.iter().any(|f| f.name == rel.fk_field) {
                return Err(RegistryError::FkFieldMissing {
                    entity,
                    relation: rel.name.clone(),
                    field: rel.fk_field.clone(),
                });
            }
        }

        let version_slot = self.version.as_deref().map(slot_of);
        let created_at_slot = self.created_at.as_deref().map(slot_of);
        let updated_at_slot = self.updated_at.as_deref().map(slot_of);

        Ok(EntityDescriptor {
            name: entity,
            fields: self.fields,
            relations: self.relations,
            id_slot,
            version_slot,
            created_at_slot,
            updated_at_slot,
            generated_id: self.generated_id,
        })
    }
}
