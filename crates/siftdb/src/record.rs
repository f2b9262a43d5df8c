use crate::{
    Error,
    error::ErrorClass,
    model::{EntityDescriptor, FieldKind},
    value::{Key, Value},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// RecordError
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum RecordError {
    #[error("id is unset on {entity} record")]
    IdUnset { entity: String },

    #[error("{entity}.{field} expects {expected}, got {found}")]
    KindMismatch {
        entity: String,
        field: String,
        expected: FieldKind,
        found: &'static str,
    },

    #[error("{entity}.{field} is not nullable")]
    NotNullable { entity: String, field: String },
}

impl RecordError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::Schema
    }
}

///
/// Record
///
/// One row of an entity: the entity name plus a slot-aligned value
/// vector. Slot positions are the descriptor's field order; unset slots
/// hold `Value::Null` until a flush stamps or a write validates them.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Record {
    entity: String,
    values: Vec<Value>,
}

impl Record {
    /// All-null record for the given descriptor.
    #[must_use]
    pub fn fresh(descriptor: &EntityDescriptor) -> Self {
        Self {
            entity: descriptor.name.clone(),
            values: vec![Value::Null; descriptor.field_count()],
        }
    }

    #[must_use]
    pub fn build(descriptor: &EntityDescriptor) -> RecordBuilder<'_> {
        RecordBuilder {
            descriptor,
            sets: Vec::new(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot)
    }

    /// Read a field by name through its descriptor.
    pub fn value(&self, descriptor: &EntityDescriptor, field: &str) -> Result<&Value, Error> {
        let slot = descriptor.slot(field)?;

        Ok(&self.values[slot])
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Value) {
        if slot < self.values.len() {
            self.values[slot] = value;
        }
    }

    /// Write a field by name with kind and nullability checks.
    pub fn set(
        &mut self,
        descriptor: &EntityDescriptor,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let slot = descriptor.slot(field)?;
        let value = value.into();
        let spec = &descriptor.fields[slot];

        if value.is_null() {
            if !spec.nullable {
                return Err(RecordError::NotNullable {
                    entity: self.entity.clone(),
                    field: spec.name.clone(),
                }
                .into());
            }
        } else if !spec.kind.matches(&value) {
            return Err(RecordError::KindMismatch {
                entity: self.entity.clone(),
                field: spec.name.clone(),
                expected: spec.kind,
                found: value.kind_name(),
            }
            .into());
        }

        self.values[slot] = value;

        Ok(())
    }

    #[must_use]
    pub fn id_value(&self, descriptor: &EntityDescriptor) -> &Value {
        &self.values[descriptor.id_slot]
    }

    /// Primary key of this record; fails while the id is still unset.
    pub fn key(&self, descriptor: &EntityDescriptor) -> Result<Key, RecordError> {
        let id = &self.values[descriptor.id_slot];
        if id.is_null() {
            return Err(RecordError::IdUnset {
                entity: self.entity.clone(),
            });
        }

        Key::try_from(id.clone()).map_err(|_| RecordError::IdUnset {
            entity: self.entity.clone(),
        })
    }

    /// Optimistic version counter, when the entity declares one and the
    /// slot has been stamped.
    #[must_use]
    pub fn version(&self, descriptor: &EntityDescriptor) -> Option<u64> {
        descriptor
            .version_slot
            .and_then(|slot| self.values[slot].as_uint())
    }
}

///
/// RecordBuilder
///
/// Collects field writes and validates them in one pass at
/// [`build`](Self::build). Null is accepted for any slot here; writes to
/// the store enforce nullability, builders only enforce kinds.
///

#[derive(Debug)]
pub struct RecordBuilder<'a> {
    descriptor: &'a EntityDescriptor,
    sets: Vec<(String, Value)>,
}

impl RecordBuilder<'_> {
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((field.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Record, Error> {
        let mut record = Record::fresh(self.descriptor);

        for (field, value) in self.sets {
            let slot = self.descriptor.slot(&field)?;
            let spec = &self.descriptor.fields[slot];

            if !value.is_null() && !spec.kind.matches(&value) {
                return Err(RecordError::KindMismatch {
                    entity: record.entity.clone(),
                    field: spec.name.clone(),
                    expected: spec.kind,
                    found: value.kind_name(),
                }
                .into());
            }

            record.values[slot] = value;
        }

        Ok(record)
    }
}
