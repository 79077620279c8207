//! Contracts the pipeline consumes: resource views and the transactional data layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dependencies::DependencyMap;
use crate::document::{AtomicAction, ResourceIdentifier, ResourceObject};
use crate::errors::{AtomicError, OperationError, StoreError};
use crate::registry::RelationshipInfo;

/// View operation an atomic operation is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewOperation {
    /// Defaults shared by every operation of a resource.
    All,
    Create,
    Update,
    Delete,
    Get,
}

impl From<AtomicAction> for ViewOperation {
    fn from(action: AtomicAction) -> Self {
        match action {
            AtomicAction::Add => Self::Create,
            AtomicAction::Update => Self::Update,
            AtomicAction::Remove => Self::Delete,
        }
    }
}

/// Position and kind of the operation being executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    pub index: usize,
    pub op: AtomicAction,
    pub resource_type: String,
}

/// Per-operation context handed to views.
#[derive(Debug, Clone)]
pub struct ViewContext {
    info: OperationInfo,
    operation: ViewOperation,
    dependencies: Arc<DependencyMap>,
    relationships: Arc<BTreeMap<String, RelationshipInfo>>,
}

impl ViewContext {
    #[must_use]
    pub fn new(
        info: OperationInfo,
        operation: ViewOperation,
        dependencies: Arc<DependencyMap>,
        relationships: Arc<BTreeMap<String, RelationshipInfo>>,
    ) -> Self {
        Self {
            info,
            operation,
            dependencies,
            relationships,
        }
    }

    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.info.resource_type
    }

    #[must_use]
    pub fn operation(&self) -> ViewOperation {
        self.operation
    }

    #[must_use]
    pub fn info(&self) -> &OperationInfo {
        &self.info
    }

    /// Resolved dependency defaults for this resource and view operation.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// Relationship metadata of the resource.
    #[must_use]
    pub fn relationships(&self) -> &BTreeMap<String, RelationshipInfo> {
        &self.relationships
    }

    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&RelationshipInfo> {
        self.relationships.get(name)
    }
}

/// View of one resource type, executed inside the request transaction.
///
/// Views receive the transaction by mutable reference only; they cannot begin,
/// commit or roll back on their own.
#[async_trait]
pub trait ResourceView<Tx>: Send + Sync {
    /// # Errors
    /// Returns `OperationError` if the object cannot be created.
    async fn process_create_object(
        &self,
        tx: &mut Tx,
        ctx: &ViewContext,
        data: ResourceObject,
    ) -> Result<ResourceObject, OperationError>;

    /// # Errors
    /// Returns `OperationError` if `id` is missing or the update is rejected.
    async fn process_update_object(
        &self,
        tx: &mut Tx,
        ctx: &ViewContext,
        id: &str,
        data: ResourceObject,
    ) -> Result<ResourceObject, OperationError>;

    /// # Errors
    /// Returns `OperationError` if `id` is missing.
    async fn process_delete_object(
        &self,
        tx: &mut Tx,
        ctx: &ViewContext,
        id: &str,
    ) -> Result<(), OperationError>;

    /// Current representation of `id`, including writes made earlier in `tx`.
    ///
    /// # Errors
    /// Returns `OperationError` if `id` is missing.
    async fn handle_get_resource_detail(
        &self,
        tx: &mut Tx,
        ctx: &ViewContext,
        id: &str,
    ) -> Result<ResourceObject, OperationError>;
}

/// How a transaction ends.
#[derive(Debug, Clone, Copy)]
pub enum TxOutcome<'a> {
    Success,
    Failure(&'a AtomicError),
}

/// Full replacement of one relationship of one resource.
#[derive(Debug, Clone)]
pub struct RelationshipUpdate<'a> {
    pub resource_type: &'a str,
    /// Name of the id field of `resource_type`.
    pub id_field: &'a str,
    pub id: &'a str,
    pub relationship: &'a str,
    pub info: &'a RelationshipInfo,
    /// New members; every identifier carries an id.
    pub linkage: Vec<ResourceIdentifier>,
}

/// Transactional data layer behind the views.
#[async_trait]
pub trait DataLayer: Send + Sync {
    type Tx: Send + 'static;

    /// # Errors
    /// Returns `StoreError` if the transaction cannot be opened.
    async fn atomic_start(&self) -> Result<Self::Tx, StoreError>;

    /// Commit on `Success`, roll back on `Failure`.
    ///
    /// # Errors
    /// Returns `StoreError` if the transaction cannot be closed.
    async fn atomic_end(&self, tx: Self::Tx, outcome: TxOutcome<'_>) -> Result<(), StoreError>;

    /// Replace the members of a relationship.
    ///
    /// # Errors
    /// Returns `OperationError` if the target or a related resource is missing.
    async fn update_relationship(
        &self,
        tx: &mut Self::Tx,
        update: RelationshipUpdate<'_>,
    ) -> Result<(), OperationError>;
}
