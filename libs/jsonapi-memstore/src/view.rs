use async_trait::async_trait;
use http::StatusCode;
use jsonapi_atomic::{
    OperationError, RelationshipData, ResourceObject, ResourceView, StoreError, ViewContext,
};
use jsonapi_errors::ErrorObject;

use crate::store::MemoryTx;
use crate::tables::Tables;

/// Generic view storing any resource type in a [`MemoryTx`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryView;

fn detail(tables: &Tables, resource_type: &str, id: &str) -> Result<ResourceObject, OperationError> {
    let record = tables
        .get(resource_type, id)
        .ok_or_else(|| StoreError::not_found(resource_type, id))?;
    let mut object = ResourceObject::new(resource_type).with_id(id);
    object.attributes.clone_from(&record.attributes);
    for (name, linkage) in record.relationships() {
        object = object.with_relationship(name, linkage);
    }
    Ok(object)
}

fn write_relationships(
    tables: &mut Tables,
    ctx: &ViewContext,
    id: &str,
    data: &ResourceObject,
) -> Result<(), OperationError> {
    for (name, relationship) in &data.relationships {
        let info = ctx.relationship(name).ok_or_else(|| {
            OperationError::value(format!(
                "Relationship '{name}' is not defined for '{}'",
                ctx.resource_type()
            ))
        })?;
        let members: Vec<String> = match &relationship.data {
            RelationshipData::ToOne(one) => one.iter().filter_map(|i| i.id.clone()).collect(),
            RelationshipData::ToMany(many) => many.iter().filter_map(|i| i.id.clone()).collect(),
        };
        tables.set_link(ctx.resource_type(), id, name, info, &members)?;
    }
    Ok(())
}

#[async_trait]
impl ResourceView<MemoryTx> for MemoryView {
    async fn process_create_object(
        &self,
        tx: &mut MemoryTx,
        ctx: &ViewContext,
        data: ResourceObject,
    ) -> Result<ResourceObject, OperationError> {
        let tables = tx.tables_mut();
        let id = tables.create(ctx.resource_type(), data.id.clone(), data.attributes.clone())?;
        write_relationships(tables, ctx, &id, &data)?;
        detail(tables, ctx.resource_type(), &id)
    }

    async fn process_update_object(
        &self,
        tx: &mut MemoryTx,
        ctx: &ViewContext,
        id: &str,
        data: ResourceObject,
    ) -> Result<ResourceObject, OperationError> {
        if data.id.as_deref().is_some_and(|data_id| data_id != id) {
            return Err(ErrorObject::new(
                StatusCode::BAD_REQUEST,
                "Bad Request",
                "obj_id and data.id should be same.",
            )
            .with_pointer("/data/id")
            .into());
        }
        let tables = tx.tables_mut();
        tables.merge_attributes(ctx.resource_type(), id, data.attributes.clone())?;
        write_relationships(tables, ctx, id, &data)?;
        detail(tables, ctx.resource_type(), id)
    }

    async fn process_delete_object(
        &self,
        tx: &mut MemoryTx,
        ctx: &ViewContext,
        id: &str,
    ) -> Result<(), OperationError> {
        tx.tables_mut().delete(ctx.resource_type(), id)?;
        Ok(())
    }

    async fn handle_get_resource_detail(
        &self,
        tx: &mut MemoryTx,
        ctx: &ViewContext,
        id: &str,
    ) -> Result<ResourceObject, OperationError> {
        detail(tx.tables(), ctx.resource_type(), id)
    }
}
