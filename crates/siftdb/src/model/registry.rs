use crate::{
    error::ErrorClass,
    model::{entity::EntityDescriptor, field::FieldKind},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum RegistryError {
    #[error("entity already registered: {entity}")]
    DuplicateEntity { entity: String },

    #[error("duplicate field on {entity}: {field}")]
    DuplicateField { entity: String, field: String },

    #[error("duplicate id declaration on {entity}: {field}")]
    DuplicateId { entity: String, field: String },

    #[error("duplicate relation on {entity}: {relation}")]
    DuplicateRelation { entity: String, relation: String },

    #[error("entity not registered: {entity}")]
    EntityNotFound { entity: String },

    #[error("field not found on {entity}: {field}")]
    FieldNotFound { entity: String, field: String },

    #[error("relation {relation} on {entity} names missing fk field: {field}")]
    FkFieldMissing {
        entity: String,
        relation: String,
        field: String,
    },

    #[error(
        "relation {relation} on {entity}: fk field is {found} but target id of {target} is {expected}"
    )]
    FkKindMismatch {
        entity: String,
        relation: String,
        target: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("id field on {entity} is not keyable: {field} ({kind})")]
    IdNotKeyable {
        entity: String,
        field: String,
        kind: FieldKind,
    },

    #[error("entity has no fields: {entity}")]
    NoFields { entity: String },

    #[error("entity has no id field: {entity}")]
    NoIdField { entity: String },

    #[error("relation {relation} on {entity} shadows a field of the same name")]
    RelationNameClash { entity: String, relation: String },

    #[error("relation not found on {entity}: {relation}")]
    RelationNotFound { entity: String, relation: String },

    #[error("relation {relation} on {entity} targets unregistered entity: {target}")]
    RelationTargetMissing {
        entity: String,
        relation: String,
        target: String,
    },
}

impl RegistryError {
    /// Unknown names and shape mistakes are all schema-class failures;
    /// record-level NotFound is reserved for the response surface.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::Schema
    }
}

///
/// RelatedRef
///
/// A one-level relation path (`"team.name"`) resolved against the
/// registry: which local slot carries the foreign key, and which slot on
/// which target entity to read.
///

#[derive(Clone, Debug)]
pub struct RelatedRef {
    pub relation: String,
    pub fk_slot: usize,
    pub target: String,
    pub target_slot: usize,
    pub target_kind: FieldKind,
}

///
/// Registry
///
/// The schema configuration of a database: every entity descriptor,
/// keyed by name. Built once at startup; cross-entity invariants are
/// checked by [`validate`](Self::validate) before a database opens.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Registry {
    entities: BTreeMap<String, EntityDescriptor>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<(), RegistryError> {
        if self.entities.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateEntity {
                entity: descriptor.name,
            });
        }

        self.entities.insert(descriptor.name.clone(), descriptor);

        Ok(())
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDescriptor, RegistryError> {
        self.entities
            .get(name)
            .ok_or_else(|| RegistryError::EntityNotFound {
                entity: name.to_string(),
            })
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    /// Cross-entity invariants: every relation target is registered and
    /// every fk field kind matches its target's id kind.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for desc in self.entities.values() {
            for rel in &desc.relations {
                let Some(target) = self.entities.get(&rel.target) else {
                    return Err(RegistryError::RelationTargetMissing {
                        entity: desc.name.clone(),
                        relation: rel.name.clone(),
                        target: rel.target.clone(),
                    });
                };

                let fk = desc.field(&rel.fk_field)?;
                let target_id = target.id_field();
                if fk.kind != target_id.kind {
                    return Err(RegistryError::FkKindMismatch {
                        entity: desc.name.clone(),
                        relation: rel.name.clone(),
                        target: rel.target.clone(),
                        expected: target_id.kind,
                        found: fk.kind,
                    });
                }
            }
        }

        Ok(())
    }

    /// Resolve `entity.relation.field` to concrete slots.
    pub fn resolve_related(
        &self,
        entity: &str,
        relation: &str,
        field: &str,
    ) -> Result<RelatedRef, RegistryError> {
        let desc = self.entity(entity)?;
        let rel = desc.relation(relation)?;
        let target = self.entity(&rel.target)?;
        let target_slot = target.slot(field)?;

        Ok(RelatedRef {
            relation: rel.name.clone(),
            fk_slot: desc.slot(&rel.fk_field)?,
            target: rel.target.clone(),
            target_slot,
            target_kind: target.fields[target_slot].kind,
        })
    }
}
