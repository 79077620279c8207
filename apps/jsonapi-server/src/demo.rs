//! Demo resources served by the binary: customers owning computers.

use jsonapi_atomic::{
    AttributeSchema, Cardinality, FieldKind, RegistryError, RelationshipInfo, Resource,
    ResourceRegistry,
};
use jsonapi_memstore::{MemoryTx, MemoryView};

/// # Errors
/// Returns `RegistryError` if the registrations are inconsistent.
pub fn registry() -> Result<ResourceRegistry<MemoryTx>, RegistryError> {
    ResourceRegistry::builder()
        .register(
            Resource::new("customer", MemoryView)
                .attributes(
                    AttributeSchema::new()
                        .required("name", FieldKind::String)
                        .nullable("email", FieldKind::String),
                )
                .relationship(
                    "computers",
                    RelationshipInfo::to_many("computer").with_inverse("owner", Cardinality::ToOne),
                ),
        )
        .register(
            Resource::new("computer", MemoryView)
                .attributes(
                    AttributeSchema::new()
                        .required("serial", FieldKind::String)
                        .field("retired", FieldKind::Boolean),
                )
                .relationship(
                    "owner",
                    RelationshipInfo::to_one("customer")
                        .with_inverse("computers", Cardinality::ToMany),
                ),
        )
        .build()
}
