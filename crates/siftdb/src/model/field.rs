use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// FieldKind
///
/// Declared type of an entity field. Aligned with the scalar
/// [`Value`] variants; lists are operand-only and never field kinds.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[remain::sorted]
pub enum FieldKind {
    Bool,
    Int,
    Text,
    Timestamp,
    Uint,
}

impl FieldKind {
    /// Whether a non-null value is of this kind.
    /// Null acceptance is a descriptor concern, not a kind concern.
    #[must_use]
    pub const fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Bool, Value::Bool(_))
                | (Self::Int, Value::Int(_))
                | (Self::Text, Value::Text(_))
                | (Self::Timestamp, Value::Timestamp(_))
                | (Self::Uint, Value::Uint(_))
        )
    }

    /// Whether fields of this kind can serve as a primary key.
    #[must_use]
    pub const fn is_keyable(self) -> bool {
        matches!(self, Self::Int | Self::Text | Self::Uint)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Uint => "uint",
        };
        write!(f, "{label}")
    }
}

///
/// FieldDescriptor
/// Runtime field metadata used by binding, validation, and writes.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FieldDescriptor {
    /// Field name as used in predicates and derived method names.
    pub name: String,
    /// Declared value kind.
    pub kind: FieldKind,
    /// Whether `Value::Null` is storable in this field.
    pub nullable: bool,
    /// Whether writes enforce a unique index over this field.
    pub unique: bool,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            unique: false,
        }
    }

    /// Whether `value` is storable in this field.
    #[must_use]
    pub const fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            self.nullable
        } else {
            self.kind.matches(value)
        }
    }
}
