//! JSON:API Atomic Operations pipeline.
//!
//! A request carries an ordered list of `add`/`update`/`remove` operations. The
//! [`AtomicHandler`] validates and binds all of them up front, then runs them in
//! order inside a single data-layer transaction, resolving client local ids
//! (`lid`) as earlier operations produce server ids. The first failure rolls
//! the whole request back.
//!
//! ```ignore
//! let registry = ResourceRegistry::builder()
//!     .register(Resource::new("customer", CustomerView).attributes(customer_schema))
//!     .build()?;
//! let handler = AtomicHandler::new(Arc::new(registry), Arc::new(store), AtomicConfig::default());
//! match handler.handle(request).await? {
//!     AtomicOutcome::Results(doc) => { /* 200 */ }
//!     AtomicOutcome::NoContent => { /* 204 */ }
//! }
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod dependencies;
pub mod document;
pub mod errors;
pub mod handler;
pub mod local_ids;
pub mod operation;
pub mod registry;
pub mod request;
pub mod schema;
pub mod view;

pub use config::{AtomicConfig, ConfigError};
pub use dependencies::{DependencyCache, DependencyMap, OperationConfig};
pub use document::{
    AtomicAction, AtomicOperationRequest, AtomicResult, AtomicResultDocument,
    OperationDescriptor, Relationship, RelationshipData, ResourceIdentifier, ResourceObject,
    ResourceRef,
};
pub use errors::{AtomicError, LocalIdError, OperationError, StoreError};
pub use handler::{AtomicHandler, AtomicOutcome, AtomicSession};
pub use local_ids::LocalIdTable;
pub use operation::{OperationPayload, PreparedOperation};
pub use registry::{
    Cardinality, Inverse, RegistryError, RelationshipInfo, Resource, ResourceRegistry,
};
pub use schema::{AcceptAll, AttributeSchema, FieldKind, InputSchema, TypedSchema, UnknownAttributes};
pub use view::{
    DataLayer, OperationInfo, RelationshipUpdate, ResourceView, TxOutcome, ViewContext,
    ViewOperation,
};
