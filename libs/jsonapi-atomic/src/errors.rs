//! Error taxonomy of the atomic pipeline and its mapping to JSON:API error objects.

use jsonapi_errors::{ErrDef, ErrorObject, ValidationViolation};
use thiserror::Error;

use crate::document::AtomicAction;

pub const INVALID_REQUEST: ErrDef = ErrDef {
    status: 400,
    title: "Invalid Atomic Request",
    code: "atomic.invalid_request",
};

pub const TOO_MANY_OPERATIONS: ErrDef = ErrDef {
    status: 413,
    title: "Too Many Operations",
    code: "atomic.too_many_operations",
};

pub const VALIDATION: ErrDef = ErrDef {
    status: 422,
    title: "Validation Error",
    code: "atomic.validation",
};

pub const NOT_FOUND: ErrDef = ErrDef {
    status: 404,
    title: "Not Found",
    code: "atomic.not_found",
};

pub const CONFLICT: ErrDef = ErrDef {
    status: 409,
    title: "Conflict",
    code: "atomic.conflict",
};

pub const STORE: ErrDef = ErrDef {
    status: 500,
    title: "Internal Server Error",
    code: "atomic.store",
};

/// Meta key carrying the index of the failed operation.
pub const META_OPERATION_INDEX: &str = "operation_index";

/// Errors raised by a data layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{resource_type} with id '{id}' not found")]
    NotFound { resource_type: String, id: String },

    #[error("related {resource_type} with id '{id}' not found")]
    RelatedNotFound { resource_type: String, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Failures of local-id resolution and registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalIdError {
    #[error(
        "Resource '{resource_type}' not found in previous operations, no lid '{lid}' defined yet"
    )]
    UnknownType { resource_type: String, lid: String },

    #[error("lid '{lid}' for '{resource_type}' not found in previous operations")]
    UnknownLid { resource_type: String, lid: String },

    #[error("lid '{lid}' for '{resource_type}' is already defined")]
    Duplicate { resource_type: String, lid: String },
}

/// Failure of a single operation, before it is attributed to its position.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Payload rejected by an input schema or relationship metadata.
    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<ValidationViolation>),

    /// Payload or reference is unusable for this operation.
    #[error("{0}")]
    Value(String),

    #[error(transparent)]
    LocalId(#[from] LocalIdError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// An error a view already expressed as a JSON:API error object.
    #[error("{}", .0.detail)]
    Rejected(Box<ErrorObject>),
}

impl OperationError {
    pub fn value(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }
}

impl From<ErrorObject> for OperationError {
    fn from(error: ErrorObject) -> Self {
        Self::Rejected(Box::new(error))
    }
}

/// Failure of a whole atomic request.
#[derive(Debug, Error)]
pub enum AtomicError {
    #[error("{detail}")]
    InvalidRequest { pointer: String, detail: String },

    #[error("Unknown resource type '{resource_type}'")]
    UnknownResourceType { index: usize, resource_type: String },

    #[error("request contains {count} operations, the limit is {max}")]
    TooManyOperations { count: usize, max: usize },

    #[error("{detail}")]
    Unprocessable {
        index: usize,
        op: AtomicAction,
        detail: String,
        violations: Vec<ValidationViolation>,
    },

    #[error("store error: {source}")]
    Store {
        /// `None` when the failure happened while committing.
        index: Option<usize>,
        #[source]
        source: StoreError,
    },

    #[error("{}", .error.detail)]
    Rejected {
        index: usize,
        error: Box<ErrorObject>,
    },
}

impl AtomicError {
    pub fn invalid_request(pointer: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            pointer: pointer.into(),
            detail: detail.into(),
        }
    }

    /// Attribute a failed operation to its position.
    #[must_use]
    pub fn from_operation(index: usize, op: AtomicAction, err: OperationError) -> Self {
        match err {
            OperationError::Validation(violations) => Self::Unprocessable {
                index,
                op,
                detail: format!(
                    "Validation error on operation {op}: {} error(s)",
                    violations.len()
                ),
                violations,
            },
            OperationError::Value(message) => Self::unprocessable(index, op, &message),
            OperationError::LocalId(e) => Self::unprocessable(index, op, &e.to_string()),
            OperationError::Store(source) => Self::Store {
                index: Some(index),
                source,
            },
            OperationError::Rejected(error) => Self::Rejected { index, error },
        }
    }

    fn unprocessable(index: usize, op: AtomicAction, message: &str) -> Self {
        Self::Unprocessable {
            index,
            op,
            detail: format!("Validation error on operation {op}: {message}"),
            violations: Vec::new(),
        }
    }

    /// Index of the operation the error is attributed to.
    #[must_use]
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            Self::InvalidRequest { .. } | Self::TooManyOperations { .. } => None,
            Self::UnknownResourceType { index, .. }
            | Self::Unprocessable { index, .. }
            | Self::Rejected { index, .. } => Some(*index),
            Self::Store { index, .. } => *index,
        }
    }
}

fn with_index(error: ErrorObject, index: Option<usize>) -> ErrorObject {
    match index {
        Some(i) => error.with_meta(META_OPERATION_INDEX, i),
        None => error,
    }
}

impl From<AtomicError> for ErrorObject {
    fn from(err: AtomicError) -> Self {
        let index = err.operation_index();
        match err {
            AtomicError::InvalidRequest { pointer, detail } => {
                INVALID_REQUEST.as_error(detail).with_pointer(pointer)
            }

            AtomicError::UnknownResourceType {
                index,
                resource_type,
            } => INVALID_REQUEST
                .as_error(format!("Unknown resource type '{resource_type}'"))
                .with_pointer(format!("/atomic:operations/{index}"))
                .with_meta(META_OPERATION_INDEX, index),

            AtomicError::TooManyOperations { count, max } => TOO_MANY_OPERATIONS
                .as_error(format!(
                    "request contains {count} operations, the limit is {max}"
                ))
                .with_pointer("/atomic:operations"),

            AtomicError::Unprocessable {
                index,
                op,
                detail,
                violations,
            } => {
                let error = VALIDATION
                    .as_error(detail)
                    .with_pointer(format!("/atomic:operations/{op}"))
                    .with_meta(META_OPERATION_INDEX, index);
                if violations.is_empty() {
                    error
                } else {
                    error.with_violations(&violations)
                }
            }

            AtomicError::Store { source, .. } => with_index(store_error(&source), index),

            // View-supplied errors pass through as they are
            AtomicError::Rejected { error, .. } => *error,
        }
    }
}

fn store_error(source: &StoreError) -> ErrorObject {
    match source {
        StoreError::NotFound { .. } | StoreError::RelatedNotFound { .. } => {
            NOT_FOUND.as_error(source.to_string())
        }
        StoreError::Conflict(_) => CONFLICT.as_error(source.to_string()),
        StoreError::Transaction(_) | StoreError::Other(_) => {
            tracing::error!(error = %source, "atomic operations failed in the data layer");
            STORE.as_error("An internal error occurred while applying atomic operations")
        }
    }
}
