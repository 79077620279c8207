//! Binding of operation descriptors and per-operation execution.

use std::sync::Arc;

use jsonapi_errors::ValidationViolation;
use serde_json::Value;
use tracing::debug;

use crate::document::{
    AtomicAction, OperationDescriptor, RelationshipData, ResourceIdentifier, ResourceObject,
    ResourceRef,
};
use crate::errors::{AtomicError, LocalIdError, OperationError};
use crate::local_ids::LocalIdTable;
use crate::registry::{Resource, ResourceRegistry};
use crate::schema::InputSchema;
use crate::view::{DataLayer, OperationInfo, RelationshipUpdate, ViewContext, ViewOperation};

const LINKAGE_EXPECTED: &str = "Atomic relationship update expects relationship linkage data";

/// Interpreted `data` member of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    Absent,
    Resource(ResourceObject),
    Linkage(RelationshipData),
}

impl OperationPayload {
    /// Interpret raw `data`. In relationship form an object is linkage unless
    /// it carries `attributes` or `relationships`.
    ///
    /// # Errors
    /// Returns the deserialization error of a malformed payload.
    pub fn interpret(data: Option<Value>, relationship_form: bool) -> Result<Self, serde_json::Error> {
        match data {
            None => Ok(Self::Absent),
            Some(Value::Null) => Ok(Self::Linkage(RelationshipData::ToOne(None))),
            Some(list @ Value::Array(_)) => {
                serde_json::from_value::<Vec<ResourceIdentifier>>(list)
                    .map(|items| Self::Linkage(RelationshipData::ToMany(items)))
            }
            Some(Value::Object(obj))
                if relationship_form
                    && !obj.contains_key("attributes")
                    && !obj.contains_key("relationships") =>
            {
                serde_json::from_value::<ResourceIdentifier>(Value::Object(obj))
                    .map(|ident| Self::Linkage(RelationshipData::ToOne(Some(ident))))
            }
            Some(other) => serde_json::from_value::<ResourceObject>(other).map(Self::Resource),
        }
    }
}

/// Operation bound to its resource registration.
pub struct BoundOperation<Tx> {
    index: usize,
    resource: Arc<Resource<Tx>>,
    target: Option<ResourceRef>,
    payload: OperationPayload,
}

impl<Tx> BoundOperation<Tx> {
    #[must_use]
    pub fn target(&self) -> Option<&ResourceRef> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn payload(&self) -> &OperationPayload {
        &self.payload
    }
}

impl<Tx> std::fmt::Debug for BoundOperation<Tx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundOperation")
            .field("index", &self.index)
            .field("resource_type", &self.resource.resource_type())
            .field("target", &self.target)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Operation ready to run, with its kind fixed at binding time.
#[derive(Debug)]
pub enum PreparedOperation<Tx> {
    Add(BoundOperation<Tx>),
    Update(BoundOperation<Tx>),
    Remove(BoundOperation<Tx>),
}

impl<Tx: Send + 'static> PreparedOperation<Tx> {
    /// Bind a validated descriptor to its registered resource.
    ///
    /// # Errors
    /// Returns `AtomicError::UnknownResourceType` if the type is not registered
    /// and `AtomicError::InvalidRequest` if `data` is malformed.
    pub fn prepare(
        index: usize,
        descriptor: OperationDescriptor,
        registry: &ResourceRegistry<Tx>,
    ) -> Result<Self, AtomicError> {
        let resource_type = descriptor
            .target
            .as_ref()
            .map(|t| t.resource_type.clone())
            .or_else(|| {
                descriptor
                    .data_object()
                    .and_then(|d| d.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .ok_or_else(|| {
                AtomicError::invalid_request(
                    format!("/atomic:operations/{index}"),
                    "operation must identify a resource type through ref or data",
                )
            })?;

        let resource = registry
            .get(&resource_type)
            .cloned()
            .ok_or(AtomicError::UnknownResourceType {
                index,
                resource_type,
            })?;

        let relationship_form = descriptor.relationship().is_some();
        let payload = OperationPayload::interpret(descriptor.data, relationship_form).map_err(|e| {
            AtomicError::invalid_request(
                format!("/atomic:operations/{index}/data"),
                format!("invalid data: {e}"),
            )
        })?;

        debug!(
            index,
            op = %descriptor.op,
            resource_type = resource.resource_type(),
            "bound atomic operation"
        );

        let bound = BoundOperation {
            index,
            resource,
            target: descriptor.target,
            payload,
        };
        Ok(match descriptor.op {
            AtomicAction::Add => Self::Add(bound),
            AtomicAction::Update => Self::Update(bound),
            AtomicAction::Remove => Self::Remove(bound),
        })
    }
}

impl<Tx> PreparedOperation<Tx> {
    #[must_use]
    pub fn action(&self) -> AtomicAction {
        match self {
            Self::Add(_) => AtomicAction::Add,
            Self::Update(_) => AtomicAction::Update,
            Self::Remove(_) => AtomicAction::Remove,
        }
    }

    #[must_use]
    pub fn view_operation(&self) -> ViewOperation {
        self.action().into()
    }

    #[must_use]
    pub fn bound(&self) -> &BoundOperation<Tx> {
        match self {
            Self::Add(op) | Self::Update(op) | Self::Remove(op) => op,
        }
    }

    fn bound_mut(&mut self) -> &mut BoundOperation<Tx> {
        match self {
            Self::Add(op) | Self::Update(op) | Self::Remove(op) => op,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &Resource<Tx> {
        &self.bound().resource
    }

    #[must_use]
    pub fn info(&self) -> OperationInfo {
        let bound = self.bound();
        OperationInfo {
            index: bound.index,
            op: self.action(),
            resource_type: bound.resource.resource_type().to_owned(),
        }
    }

    /// Lid declared by this operation; it is registered once the operation
    /// yields an id.
    ///
    /// An `add` declares its `data.lid`. An `update` that targets its resource
    /// through `ref` declares a `data.lid` still present after
    /// [`Self::resolve_local_ids`], meaning the lid was not known yet.
    #[must_use]
    pub fn declared_lid(&self) -> Option<&str> {
        match self {
            Self::Add(BoundOperation {
                payload: OperationPayload::Resource(data),
                ..
            })
            | Self::Update(BoundOperation {
                target: Some(ResourceRef { id: Some(_), .. }),
                payload: OperationPayload::Resource(data),
                ..
            }) => data.lid.as_deref(),
            _ => None,
        }
    }

    /// Rewrite every lid reference of this operation to the resolved id.
    ///
    /// An `add`'s own `data.lid` is a declaration and is left alone, as is an
    /// unknown `data.lid` of an `update` that carries a `ref`.
    ///
    /// # Errors
    /// Returns `LocalIdError` for the first unknown lid.
    pub fn resolve_local_ids(&mut self, table: &LocalIdTable) -> Result<(), LocalIdError> {
        let is_add = matches!(self, Self::Add(_));
        let bound = self.bound_mut();
        if let Some(target) = bound.target.as_mut() {
            table.resolve_ref(target)?;
        }
        let targeted = bound.target.as_ref().is_some_and(|t| t.id.is_some());
        match &mut bound.payload {
            OperationPayload::Resource(data) => {
                if !is_add && let Some(lid) = data.lid.as_deref() {
                    match table.resolve(&data.resource_type, lid) {
                        Ok(id) => {
                            data.id = Some(id.to_owned());
                            data.lid = None;
                        }
                        Err(_) if targeted => {}
                        Err(e) => return Err(e),
                    }
                }
                for relationship in data.relationships.values_mut() {
                    table.resolve_linkage(&mut relationship.data)?;
                }
            }
            OperationPayload::Linkage(linkage) => table.resolve_linkage(linkage)?,
            OperationPayload::Absent => {}
        }
        Ok(())
    }

    /// Run the operation inside `tx`.
    ///
    /// # Errors
    /// Returns `OperationError` if the payload is rejected or the view or data
    /// layer fails.
    pub async fn execute<D>(
        self,
        data_layer: &D,
        tx: &mut Tx,
        ctx: &ViewContext,
    ) -> Result<Option<ResourceObject>, OperationError>
    where
        D: DataLayer<Tx = Tx>,
        Tx: Send + 'static,
    {
        match self {
            Self::Add(op) => execute_add(op, tx, ctx).await.map(Some),
            Self::Update(op) if op.target.as_ref().is_some_and(|t| t.relationship.is_some()) => {
                execute_relationship_update(op, data_layer, tx, ctx)
                    .await
                    .map(Some)
            }
            Self::Update(op) => execute_update(op, tx, ctx).await.map(Some),
            Self::Remove(op) => execute_remove(op, tx, ctx).await.map(|()| None),
        }
    }
}

async fn execute_add<Tx: Send + 'static>(
    op: BoundOperation<Tx>,
    tx: &mut Tx,
    ctx: &ViewContext,
) -> Result<ResourceObject, OperationError> {
    let OperationPayload::Resource(mut data) = op.payload else {
        return Err(OperationError::value(
            "add operation requires data to be a resource object",
        ));
    };
    // The lid was registered by the coordinator; it never reaches the store
    data.lid = None;
    validate_input(op.resource.create_input(), &mut data)?;
    validate_relationships(&op.resource, &data)?;
    op.resource.view().process_create_object(tx, ctx, data).await
}

async fn execute_update<Tx: Send + 'static>(
    op: BoundOperation<Tx>,
    tx: &mut Tx,
    ctx: &ViewContext,
) -> Result<ResourceObject, OperationError> {
    let OperationPayload::Resource(mut data) = op.payload else {
        return Err(OperationError::value(
            "update operation requires data to be a resource object",
        ));
    };
    let id = op
        .target
        .and_then(|t| t.id)
        .or_else(|| data.id.clone())
        .ok_or_else(|| OperationError::value("update operation must contain an 'id' in ref or data"))?;
    // A lid left here is a declaration registered by the coordinator
    data.lid = None;
    if data.id.is_none() {
        data.id = Some(id.clone());
    }
    validate_input(op.resource.update_input(), &mut data)?;
    validate_relationships(&op.resource, &data)?;
    op.resource
        .view()
        .process_update_object(tx, ctx, &id, data)
        .await
}

async fn execute_relationship_update<D, Tx>(
    op: BoundOperation<Tx>,
    data_layer: &D,
    tx: &mut Tx,
    ctx: &ViewContext,
) -> Result<ResourceObject, OperationError>
where
    D: DataLayer<Tx = Tx>,
    Tx: Send + 'static,
{
    let OperationPayload::Linkage(linkage) = op.payload else {
        return Err(OperationError::value(LINKAGE_EXPECTED));
    };
    let Some(target) = op.target else {
        return Err(OperationError::value(LINKAGE_EXPECTED));
    };
    let name = target.relationship.unwrap_or_default();
    let id = target.id.ok_or_else(|| {
        OperationError::value("relationship update must contain an 'id' in ref")
    })?;
    let resource = op.resource.as_ref();
    let info = resource.relationship_info(&name).ok_or_else(|| {
        OperationError::value(format!(
            "Relationship '{name}' is not defined for '{}'",
            resource.resource_type()
        ))
    })?;

    let members = match (info.is_to_many(), linkage) {
        (true, RelationshipData::ToMany(items)) => items,
        (false, RelationshipData::ToOne(item)) => item.into_iter().collect(),
        (true, RelationshipData::ToOne(_)) => {
            return Err(OperationError::value(format!(
                "Relationship '{name}' is to-many and expects a list of resource identifiers"
            )));
        }
        (false, RelationshipData::ToMany(_)) => {
            return Err(OperationError::value(format!(
                "Relationship '{name}' is to-one and expects a single resource identifier or null"
            )));
        }
    };
    for member in &members {
        if member.resource_type != info.related_type {
            return Err(OperationError::value(format!(
                "Relationship '{name}' expects '{}' identifiers, got '{}'",
                info.related_type, member.resource_type
            )));
        }
        if member.id.is_none() {
            return Err(OperationError::value(format!(
                "Relationship '{name}' linkage must contain an 'id'"
            )));
        }
    }

    data_layer
        .update_relationship(
            tx,
            RelationshipUpdate {
                resource_type: resource.resource_type(),
                id_field: resource.id_field_name(),
                id: &id,
                relationship: &name,
                info,
                linkage: members,
            },
        )
        .await?;
    resource.view().handle_get_resource_detail(tx, ctx, &id).await
}

async fn execute_remove<Tx: Send + 'static>(
    op: BoundOperation<Tx>,
    tx: &mut Tx,
    ctx: &ViewContext,
) -> Result<(), OperationError> {
    let id = op
        .target
        .and_then(|t| t.id)
        .ok_or_else(|| OperationError::value("remove operation must contain an 'id' in ref"))?;
    op.resource.view().process_delete_object(tx, ctx, &id).await
}

/// Run the input schema and root its violation paths at `data.`.
fn validate_input(schema: &dyn InputSchema, data: &mut ResourceObject) -> Result<(), OperationError> {
    schema.validate(data).map_err(|violations| {
        OperationError::Validation(
            violations
                .into_iter()
                .map(|mut v| {
                    v.field = format!("data.{}", v.field);
                    v
                })
                .collect(),
        )
    })
}

/// Check relationships of a resource object against the resource's metadata.
fn validate_relationships<Tx>(
    resource: &Resource<Tx>,
    data: &ResourceObject,
) -> Result<(), OperationError> {
    let mut violations = Vec::new();
    for (name, relationship) in &data.relationships {
        let path = format!("data.relationships.{name}");
        let Some(info) = resource.relationship_info(name) else {
            violations.push(
                ValidationViolation::new(path, "unknown relationship").with_code("unknown"),
            );
            continue;
        };
        match (&relationship.data, info.is_to_many()) {
            (RelationshipData::ToOne(_), true) => violations.push(
                ValidationViolation::new(format!("{path}.data"), "input should be a valid list")
                    .with_code("list_type"),
            ),
            (RelationshipData::ToMany(_), false) => violations.push(
                ValidationViolation::new(
                    format!("{path}.data"),
                    "input should be a single resource identifier or null",
                )
                .with_code("model_type"),
            ),
            _ => {}
        }
        for ident in relationship.data.identifiers() {
            if ident.resource_type != info.related_type {
                violations.push(
                    ValidationViolation::new(
                        format!("{path}.data"),
                        format!(
                            "expected type '{}', got '{}'",
                            info.related_type, ident.resource_type
                        ),
                    )
                    .with_code("type_mismatch"),
                );
            }
            if ident.id.is_none() {
                violations.push(
                    ValidationViolation::new(format!("{path}.data"), "resource identifier must contain an 'id'")
                        .with_code("missing"),
                );
            }
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(OperationError::Validation(violations))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relationship_form_keeps_resource_objects_for_rejection() {
        let payload = OperationPayload::interpret(
            Some(json!({"type": "computer", "id": "5", "attributes": {"serial": "X"}})),
            true,
        )
        .unwrap();
        assert!(matches!(payload, OperationPayload::Resource(_)));

        let payload =
            OperationPayload::interpret(Some(json!({"type": "computer", "id": "5"})), true).unwrap();
        assert_eq!(
            payload,
            OperationPayload::Linkage(RelationshipData::ToOne(Some(ResourceIdentifier::new(
                "computer", "5"
            ))))
        );
    }

    #[test]
    fn null_and_lists_are_linkage() {
        assert_eq!(
            OperationPayload::interpret(Some(Value::Null), true).unwrap(),
            OperationPayload::Linkage(RelationshipData::ToOne(None))
        );
        assert_eq!(
            OperationPayload::interpret(Some(json!([])), true).unwrap(),
            OperationPayload::Linkage(RelationshipData::ToMany(vec![]))
        );
        assert_eq!(
            OperationPayload::interpret(None, false).unwrap(),
            OperationPayload::Absent
        );
    }

    #[test]
    fn primary_form_parses_resource_objects() {
        let payload = OperationPayload::interpret(
            Some(json!({"type": "customer", "lid": "c1", "attributes": {"name": "Ann"}})),
            false,
        )
        .unwrap();
        let OperationPayload::Resource(data) = payload else {
            panic!("expected a resource object");
        };
        assert_eq!(data.lid.as_deref(), Some("c1"));
        assert!(OperationPayload::interpret(Some(json!({"id": "1"})), false).is_err());
    }
}
