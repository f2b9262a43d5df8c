pub mod entity;
pub mod field;
pub mod registry;
pub mod relation;

pub use entity::{EntityBuilder, EntityDescriptor};
pub use field::{FieldDescriptor, FieldKind};
pub use registry::{Registry, RegistryError, RelatedRef};
pub use relation::RelationDescriptor;
