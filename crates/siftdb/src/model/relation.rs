use serde::{Deserialize, Serialize};

///
/// FetchMode
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum FetchMode {
    /// Resolve at load time and cache on the managed handle.
    Eager,
    /// Resolve on first access through the owning session.
    #[default]
    Lazy,
}

///
/// RelationDescriptor
///
/// A to-one association. The local `fk_field` holds the target entity's
/// primary key (or null when the relation is unset).
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RelationDescriptor {
    /// Relation name as used in paths (`"team.name"`).
    pub name: String,
    /// Target entity name.
    pub target: String,
    /// Local field holding the target primary key.
    pub fk_field: String,
    /// When to resolve the target record.
    pub fetch: FetchMode,
}

impl RelationDescriptor {
    #[must_use]
    pub const fn is_eager(&self) -> bool {
        matches!(self.fetch, FetchMode::Eager)
    }
}
