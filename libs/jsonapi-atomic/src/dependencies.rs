//! Default values for view dependencies, resolved per `(resource type, view operation)`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::view::ViewOperation;

/// Resolved dependency defaults handed to a view.
pub type DependencyMap = Map<String, Value>;

/// Dependency defaults declared for one view operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationConfig {
    defaults: DependencyMap,
}

impl OperationConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn defaults(&self) -> &DependencyMap {
        &self.defaults
    }
}

/// Overlay the specific operation's defaults on top of the `All` defaults.
#[must_use]
pub fn merge_defaults(
    configs: &HashMap<ViewOperation, OperationConfig>,
    operation: ViewOperation,
) -> DependencyMap {
    let mut merged = configs
        .get(&ViewOperation::All)
        .map(|c| c.defaults.clone())
        .unwrap_or_default();
    if operation != ViewOperation::All
        && let Some(specific) = configs.get(&operation)
    {
        merged.extend(specific.defaults.clone());
    }
    merged
}

/// Shared, lazily filled cache of resolved dependency defaults.
///
/// Entries are computed on first use and never change afterwards, so the cache
/// is safe to share across concurrent requests.
#[derive(Debug, Default)]
pub struct DependencyCache {
    entries: DashMap<(String, ViewOperation), Arc<DependencyMap>>,
}

impl DependencyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        resource_type: &str,
        operation: ViewOperation,
        configs: &HashMap<ViewOperation, OperationConfig>,
    ) -> Arc<DependencyMap> {
        let key = (resource_type.to_owned(), operation);
        if let Some(hit) = self.entries.get(&key) {
            return Arc::clone(hit.value());
        }
        let computed = Arc::new(merge_defaults(configs, operation));
        Arc::clone(self.entries.entry(key).or_insert(computed).value())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
