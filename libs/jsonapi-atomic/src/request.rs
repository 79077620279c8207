//! Shape validation of an atomic request, performed before any operation runs.

use std::collections::HashSet;

use serde_json::Value;

use crate::config::AtomicConfig;
use crate::document::{AtomicAction, AtomicOperationRequest, OperationDescriptor, ResourceRef};
use crate::errors::AtomicError;

fn pointer(index: usize, member: &str) -> String {
    if member.is_empty() {
        format!("/atomic:operations/{index}")
    } else {
        format!("/atomic:operations/{index}/{member}")
    }
}

/// Validate the request shape and its limits.
///
/// # Errors
/// Returns `AtomicError::TooManyOperations` above the configured limit and
/// `AtomicError::InvalidRequest` pointing at the first malformed member.
pub fn validate_request(
    request: &AtomicOperationRequest,
    config: &AtomicConfig,
) -> Result<(), AtomicError> {
    let count = request.operations.len();
    if count > config.max_operations {
        return Err(AtomicError::TooManyOperations {
            count,
            max: config.max_operations,
        });
    }

    let mut declared: HashSet<(&str, &str)> = HashSet::new();
    for (index, op) in request.operations.iter().enumerate() {
        validate_operation(index, op)?;
        let Some(data) = op.data_object() else {
            continue;
        };
        let resource_type = data.get("type").and_then(Value::as_str);
        let lid = data.get("lid").and_then(Value::as_str);
        let (Some(resource_type), Some(lid)) = (resource_type, lid) else {
            continue;
        };
        match op.op {
            AtomicAction::Add => {
                if !declared.insert((resource_type, lid)) {
                    return Err(AtomicError::invalid_request(
                        pointer(index, "data/lid"),
                        format!("lid '{lid}' for '{resource_type}' is declared more than once"),
                    ));
                }
            }
            // An update with a ref names a lid not seen before; later uses refer to it
            AtomicAction::Update if op.target.is_some() && op.relationship().is_none() => {
                declared.insert((resource_type, lid));
            }
            AtomicAction::Update | AtomicAction::Remove => {}
        }
    }
    Ok(())
}

/// Validate one operation descriptor.
///
/// # Errors
/// Returns `AtomicError::InvalidRequest` pointing at the offending member.
pub fn validate_operation(index: usize, op: &OperationDescriptor) -> Result<(), AtomicError> {
    if let Some(target) = &op.target {
        validate_ref(index, op.op, target)?;
    }

    match op.op {
        AtomicAction::Add => {
            if op.data_object().is_none() {
                return Err(AtomicError::invalid_request(
                    pointer(index, "data"),
                    "add operation requires data to be a resource object",
                ));
            }
        }
        AtomicAction::Update => {
            if op.data.is_none() {
                return Err(AtomicError::invalid_request(
                    pointer(index, "data"),
                    "update operation requires data",
                ));
            }
            if op.target.is_none() && op.data_object().is_none() {
                return Err(AtomicError::invalid_request(
                    pointer(index, ""),
                    "update operation requires ref or a resource object in data",
                ));
            }
        }
        AtomicAction::Remove => {
            if op.target.is_none() {
                return Err(AtomicError::invalid_request(
                    pointer(index, ""),
                    "ref should be present for remove operations",
                ));
            }
            if op.data_object().is_some() {
                return Err(AtomicError::invalid_request(
                    pointer(index, "data"),
                    "remove operation must not contain a resource object",
                ));
            }
        }
    }

    if op.relationship().is_none() {
        validate_resource_object(index, op)?;
    }
    Ok(())
}

fn validate_ref(index: usize, action: AtomicAction, target: &ResourceRef) -> Result<(), AtomicError> {
    if target.relationship.is_some() && action != AtomicAction::Update {
        return Err(AtomicError::invalid_request(
            pointer(index, "ref/relationship"),
            format!(
                "relationship membership changes through '{action}' are not supported, use 'update' to replace the relationship"
            ),
        ));
    }
    if action == AtomicAction::Add {
        return Err(AtomicError::invalid_request(
            pointer(index, "ref"),
            "ref is not allowed for add operations",
        ));
    }
    match (&target.id, &target.lid) {
        (Some(_), Some(_)) => Err(AtomicError::invalid_request(
            pointer(index, "ref"),
            "ref must not contain both 'id' and 'lid'",
        )),
        (None, None) => Err(AtomicError::invalid_request(
            pointer(index, "ref"),
            "ref must contain 'id' or 'lid'",
        )),
        _ => Ok(()),
    }
}

fn validate_resource_object(index: usize, op: &OperationDescriptor) -> Result<(), AtomicError> {
    let Some(data) = op.data_object() else {
        return Ok(());
    };
    let Some(data_type) = data.get("type").and_then(Value::as_str) else {
        return Err(AtomicError::invalid_request(
            pointer(index, "data/type"),
            "resource object must contain a 'type' member",
        ));
    };
    if let Some(target) = &op.target
        && target.resource_type != data_type
    {
        return Err(AtomicError::invalid_request(
            pointer(index, "data/type"),
            format!(
                "data type '{data_type}' does not match ref type '{}'",
                target.resource_type
            ),
        ));
    }
    if data.contains_key("id") && data.contains_key("lid") {
        return Err(AtomicError::invalid_request(
            pointer(index, "data"),
            "resource object must not contain both 'id' and 'lid'",
        ));
    }
    Ok(())
}
