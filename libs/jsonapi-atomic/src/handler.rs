//! Transaction coordinator: runs every operation of a request inside one transaction.

use std::sync::Arc;

use tracing::{Instrument, debug, info_span, warn};

use crate::config::AtomicConfig;
use crate::dependencies::DependencyCache;
use crate::document::{AtomicOperationRequest, AtomicResult, AtomicResultDocument};
use crate::errors::{AtomicError, OperationError, StoreError};
use crate::local_ids::LocalIdTable;
use crate::operation::PreparedOperation;
use crate::registry::ResourceRegistry;
use crate::request::validate_request;
use crate::view::{DataLayer, OperationInfo, TxOutcome, ViewContext};

/// Outcome of a successful atomic request.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicOutcome {
    /// At least one operation produced data.
    Results(AtomicResultDocument),
    /// Every operation produced an empty result.
    NoContent,
}

/// Shared entry point of the atomic pipeline; one per registry and data layer.
pub struct AtomicHandler<D: DataLayer> {
    registry: Arc<ResourceRegistry<D::Tx>>,
    data_layer: Arc<D>,
    dependencies: Arc<DependencyCache>,
    config: AtomicConfig,
}

impl<D: DataLayer> std::fmt::Debug for AtomicHandler<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicHandler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<D: DataLayer> AtomicHandler<D> {
    #[must_use]
    pub fn new(
        registry: Arc<ResourceRegistry<D::Tx>>,
        data_layer: Arc<D>,
        config: AtomicConfig,
    ) -> Self {
        Self {
            registry,
            data_layer,
            dependencies: Arc::new(DependencyCache::new()),
            config,
        }
    }

    /// Share a dependency cache with other handlers.
    #[must_use]
    pub fn with_dependency_cache(mut self, cache: Arc<DependencyCache>) -> Self {
        self.dependencies = cache;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AtomicConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry<D::Tx> {
        &self.registry
    }

    #[must_use]
    pub fn dependency_cache(&self) -> &DependencyCache {
        &self.dependencies
    }

    /// Fresh per-request state.
    #[must_use]
    pub fn session(&self) -> AtomicSession<'_, D> {
        AtomicSession {
            handler: self,
            local_ids: LocalIdTable::new(),
            tx: None,
            current: None,
        }
    }

    /// Run `request` in a new session.
    ///
    /// # Errors
    /// See [`AtomicSession::execute`].
    pub async fn handle(&self, request: AtomicOperationRequest) -> Result<AtomicOutcome, AtomicError> {
        self.session().execute(request).await
    }
}

/// State of one atomic request: local ids, the open transaction and the
/// operation being executed.
///
/// Dropping a session with an open transaction drops the handle without
/// committing it.
pub struct AtomicSession<'h, D: DataLayer> {
    handler: &'h AtomicHandler<D>,
    local_ids: LocalIdTable,
    tx: Option<D::Tx>,
    current: Option<OperationInfo>,
}

/// Marks the operation being executed and clears the mark on every exit path.
struct OperationScope<'s> {
    slot: &'s mut Option<OperationInfo>,
}

impl<'s> OperationScope<'s> {
    fn enter(slot: &'s mut Option<OperationInfo>, info: OperationInfo) -> Self {
        *slot = Some(info);
        Self { slot }
    }
}

impl Drop for OperationScope<'_> {
    fn drop(&mut self) {
        *self.slot = None;
    }
}

impl<D: DataLayer> AtomicSession<'_, D> {
    /// Operation currently executing; `None` between operations.
    #[must_use]
    pub fn current_operation(&self) -> Option<&OperationInfo> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn local_ids(&self) -> &LocalIdTable {
        &self.local_ids
    }

    /// Validate, bind and run every operation of `request`, then commit.
    ///
    /// # Errors
    /// Returns the error of the first failing step. Nothing is committed in
    /// that case.
    pub async fn execute(
        &mut self,
        request: AtomicOperationRequest,
    ) -> Result<AtomicOutcome, AtomicError> {
        validate_request(&request, &self.handler.config)?;
        let operations = request
            .operations
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| {
                PreparedOperation::prepare(index, descriptor, &self.handler.registry)
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = operations.len(), "atomic request bound");

        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            let info = operation.info();
            let span = info_span!(
                "atomic_operation",
                index = info.index,
                op = %info.op,
                resource_type = %info.resource_type
            );
            match self.run_operation(operation).instrument(span).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    self.rollback(&err).await;
                    return Err(err);
                }
            }
        }

        self.commit().await?;

        if results.iter().all(AtomicResult::is_empty) {
            Ok(AtomicOutcome::NoContent)
        } else {
            Ok(AtomicOutcome::Results(AtomicResultDocument { results }))
        }
    }

    async fn run_operation(
        &mut self,
        mut operation: PreparedOperation<D::Tx>,
    ) -> Result<AtomicResult, AtomicError> {
        let Self {
            handler,
            local_ids,
            tx,
            current,
        } = self;
        let info = operation.info();
        let _scope = OperationScope::enter(current, info.clone());
        let fail = |err: OperationError| AtomicError::from_operation(info.index, info.op, err);

        let open = match tx.take() {
            Some(open) => open,
            None => handler
                .data_layer
                .atomic_start()
                .await
                .map_err(|source| AtomicError::Store {
                    index: Some(info.index),
                    source,
                })?,
        };
        let tx = tx.insert(open);

        let resource = operation.resource();
        let dependencies = handler.dependencies.resolve(
            resource.resource_type(),
            operation.view_operation(),
            resource.operation_configs(),
        );
        let ctx = ViewContext::new(
            info.clone(),
            operation.view_operation(),
            dependencies,
            Arc::clone(resource.relationships()),
        );

        operation
            .resolve_local_ids(local_ids)
            .map_err(|e| fail(e.into()))?;
        let declared = operation.declared_lid().map(str::to_owned);

        let produced = operation
            .execute(handler.data_layer.as_ref(), tx, &ctx)
            .await
            .map_err(fail)?;

        let Some(data) = produced else {
            return Ok(AtomicResult::default());
        };
        if let (Some(lid), Some(id)) = (declared, data.id.as_deref()) {
            local_ids
                .register(&info.resource_type, &lid, id)
                .map_err(|e| fail(e.into()))?;
            debug!(lid = %lid, id, "local id resolved");
        }
        Ok(AtomicResult::data(data))
    }

    async fn rollback(&mut self, err: &AtomicError) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        if let Err(e) = self
            .handler
            .data_layer
            .atomic_end(tx, TxOutcome::Failure(err))
            .await
        {
            warn!(error = %e, "failed to roll back atomic transaction");
        }
    }

    async fn commit(&mut self) -> Result<(), AtomicError> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        self.handler
            .data_layer
            .atomic_end(tx, TxOutcome::Success)
            .await
            .map_err(|source: StoreError| AtomicError::Store {
                index: None,
                source,
            })?;
        debug!("atomic transaction committed");
        Ok(())
    }
}
