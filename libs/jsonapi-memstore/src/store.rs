use std::sync::Arc;

use async_trait::async_trait;
use jsonapi_atomic::{DataLayer, OperationError, RelationshipUpdate, StoreError, TxOutcome};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::tables::{Record, Tables};

/// Shared in-memory data layer.
///
/// One transaction holds the store lock from `atomic_start` to `atomic_end`, so
/// atomic requests are applied one at a time.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

/// Open transaction: a working copy published on commit.
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl std::fmt::Debug for MemoryTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTx").finish_non_exhaustive()
    }
}

impl MemoryTx {
    #[must_use]
    pub fn tables(&self) -> &Tables {
        &self.working
    }

    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.working
    }

    fn commit(mut self) {
        *self.guard = self.working;
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record outside of any atomic request.
    ///
    /// # Errors
    /// Returns `StoreError::Conflict` if the id is taken.
    pub async fn insert(
        &self,
        resource_type: &str,
        id: Option<&str>,
        attributes: Map<String, Value>,
    ) -> Result<String, StoreError> {
        self.tables
            .lock()
            .await
            .create(resource_type, id.map(str::to_owned), attributes)
    }

    /// Committed state of a record.
    pub async fn get(&self, resource_type: &str, id: &str) -> Option<Record> {
        self.tables.lock().await.get(resource_type, id).cloned()
    }

    /// Committed ids of a resource type, in order.
    pub async fn ids(&self, resource_type: &str) -> Vec<String> {
        self.tables.lock().await.ids(resource_type)
    }
}

#[async_trait]
impl DataLayer for MemoryStore {
    type Tx = MemoryTx;

    async fn atomic_start(&self) -> Result<MemoryTx, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        debug!("memory transaction started");
        Ok(MemoryTx { guard, working })
    }

    async fn atomic_end(&self, tx: MemoryTx, outcome: TxOutcome<'_>) -> Result<(), StoreError> {
        match outcome {
            TxOutcome::Success => {
                tx.commit();
                debug!("memory transaction committed");
            }
            TxOutcome::Failure(err) => {
                drop(tx);
                debug!(error = %err, "memory transaction rolled back");
            }
        }
        Ok(())
    }

    async fn update_relationship(
        &self,
        tx: &mut MemoryTx,
        update: RelationshipUpdate<'_>,
    ) -> Result<(), OperationError> {
        let members: Vec<String> = update
            .linkage
            .into_iter()
            .filter_map(|ident| ident.id)
            .collect();
        tx.tables_mut().set_link(
            update.resource_type,
            update.id,
            update.relationship,
            update.info,
            &members,
        )?;
        Ok(())
    }
}
