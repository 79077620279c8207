//! Resource registry: resolves a resource type to its view, schemas and metadata.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dependencies::OperationConfig;
use crate::schema::{AcceptAll, AttributeSchema, InputSchema};
use crate::view::{ResourceView, ViewOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// The relationship on the related type that mirrors this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inverse {
    pub name: String,
    pub cardinality: Cardinality,
}

/// Relationship metadata of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInfo {
    pub related_type: String,
    pub cardinality: Cardinality,
    /// Id field of the related resource.
    pub id_field: String,
    pub inverse: Option<Inverse>,
}

impl RelationshipInfo {
    pub fn to_one(related_type: impl Into<String>) -> Self {
        Self::new(related_type, Cardinality::ToOne)
    }

    pub fn to_many(related_type: impl Into<String>) -> Self {
        Self::new(related_type, Cardinality::ToMany)
    }

    fn new(related_type: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            related_type: related_type.into(),
            cardinality,
            id_field: "id".to_owned(),
            inverse: None,
        }
    }

    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    #[must_use]
    pub fn with_inverse(mut self, name: impl Into<String>, cardinality: Cardinality) -> Self {
        self.inverse = Some(Inverse {
            name: name.into(),
            cardinality,
        });
        self
    }

    #[must_use]
    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("resource type '{0}' is registered more than once")]
    DuplicateResourceType(String),

    #[error("relationship '{resource_type}.{relationship}' points at unregistered type '{related_type}'")]
    UnknownRelatedType {
        resource_type: String,
        relationship: String,
        related_type: String,
    },

    #[error("inverse of '{resource_type}.{relationship}' does not match '{related_type}.{inverse}'")]
    InverseMismatch {
        resource_type: String,
        relationship: String,
        related_type: String,
        inverse: String,
    },
}

/// Registration of one resource type.
pub struct Resource<Tx> {
    resource_type: String,
    id_field: String,
    view: Arc<dyn ResourceView<Tx>>,
    create_schema: Arc<dyn InputSchema>,
    update_schema: Arc<dyn InputSchema>,
    relationships: Arc<BTreeMap<String, RelationshipInfo>>,
    dependencies: HashMap<ViewOperation, OperationConfig>,
}

impl<Tx: Send + 'static> Resource<Tx> {
    pub fn new(resource_type: impl Into<String>, view: impl ResourceView<Tx> + 'static) -> Self {
        Self {
            resource_type: resource_type.into(),
            id_field: "id".to_owned(),
            view: Arc::new(view),
            create_schema: Arc::new(AcceptAll),
            update_schema: Arc::new(AcceptAll),
            relationships: Arc::new(BTreeMap::new()),
            dependencies: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    #[must_use]
    pub fn create_schema(mut self, schema: impl InputSchema + 'static) -> Self {
        self.create_schema = Arc::new(schema);
        self
    }

    #[must_use]
    pub fn update_schema(mut self, schema: impl InputSchema + 'static) -> Self {
        self.update_schema = Arc::new(schema);
        self
    }

    /// Use `schema` for creates and its partial form for updates.
    #[must_use]
    pub fn attributes(self, schema: AttributeSchema) -> Self {
        let partial = schema.partial();
        self.create_schema(schema).update_schema(partial)
    }

    #[must_use]
    pub fn relationship(mut self, name: impl Into<String>, info: RelationshipInfo) -> Self {
        Arc::make_mut(&mut self.relationships).insert(name.into(), info);
        self
    }

    #[must_use]
    pub fn dependencies(mut self, operation: ViewOperation, config: OperationConfig) -> Self {
        self.dependencies.insert(operation, config);
        self
    }
}

impl<Tx> Resource<Tx> {
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    #[must_use]
    pub fn id_field_name(&self) -> &str {
        &self.id_field
    }

    #[must_use]
    pub fn view(&self) -> &dyn ResourceView<Tx> {
        self.view.as_ref()
    }

    #[must_use]
    pub fn create_input(&self) -> &dyn InputSchema {
        self.create_schema.as_ref()
    }

    #[must_use]
    pub fn update_input(&self) -> &dyn InputSchema {
        self.update_schema.as_ref()
    }

    #[must_use]
    pub fn relationship_info(&self, name: &str) -> Option<&RelationshipInfo> {
        self.relationships.get(name)
    }

    #[must_use]
    pub fn relationships(&self) -> &Arc<BTreeMap<String, RelationshipInfo>> {
        &self.relationships
    }

    #[must_use]
    pub fn operation_configs(&self) -> &HashMap<ViewOperation, OperationConfig> {
        &self.dependencies
    }
}

impl<Tx> fmt::Debug for Resource<Tx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("resource_type", &self.resource_type)
            .field("id_field", &self.id_field)
            .field("relationships", &self.relationships)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from resource type to its registration.
pub struct ResourceRegistry<Tx> {
    resources: HashMap<String, Arc<Resource<Tx>>>,
}

impl<Tx: Send + 'static> ResourceRegistry<Tx> {
    #[must_use]
    pub fn builder() -> ResourceRegistryBuilder<Tx> {
        ResourceRegistryBuilder {
            resources: Vec::new(),
        }
    }
}

impl<Tx> ResourceRegistry<Tx> {
    #[must_use]
    pub fn get(&self, resource_type: &str) -> Option<&Arc<Resource<Tx>>> {
        self.resources.get(resource_type)
    }

    /// Registered resource types, sorted.
    #[must_use]
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl<Tx> fmt::Debug for ResourceRegistry<Tx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

pub struct ResourceRegistryBuilder<Tx> {
    resources: Vec<Resource<Tx>>,
}

impl<Tx: Send + 'static> ResourceRegistryBuilder<Tx> {
    #[must_use]
    pub fn register(mut self, resource: Resource<Tx>) -> Self {
        self.resources.push(resource);
        self
    }

    /// # Errors
    /// Returns `RegistryError` on duplicate types, relationships pointing at
    /// unregistered types, or inverses that the related type does not declare.
    pub fn build(self) -> Result<ResourceRegistry<Tx>, RegistryError> {
        let mut resources = HashMap::with_capacity(self.resources.len());
        for resource in self.resources {
            let key = resource.resource_type.clone();
            if resources.insert(key.clone(), Arc::new(resource)).is_some() {
                return Err(RegistryError::DuplicateResourceType(key));
            }
        }
        check_relationships(&resources)?;
        Ok(ResourceRegistry { resources })
    }
}

fn check_relationships<Tx>(
    resources: &HashMap<String, Arc<Resource<Tx>>>,
) -> Result<(), RegistryError> {
    for resource in resources.values() {
        for (name, info) in resource.relationships.iter() {
            let Some(related) = resources.get(&info.related_type) else {
                return Err(RegistryError::UnknownRelatedType {
                    resource_type: resource.resource_type.clone(),
                    relationship: name.clone(),
                    related_type: info.related_type.clone(),
                });
            };
            let Some(inverse) = &info.inverse else {
                continue;
            };
            let mirrored = related.relationship_info(&inverse.name).is_some_and(|back| {
                back.related_type == resource.resource_type
                    && back.cardinality == inverse.cardinality
            });
            if !mirrored {
                return Err(RegistryError::InverseMismatch {
                    resource_type: resource.resource_type.clone(),
                    relationship: name.clone(),
                    related_type: info.related_type.clone(),
                    inverse: inverse.name.clone(),
                });
            }
        }
    }
    Ok(())
}
