//! JSON:API error types
//!
//! This crate provides pure data types for error reporting, with no dependencies
//! on HTTP frameworks unless the `axum` feature is enabled. It includes:
//! - JSON:API error objects and documents (`ErrorObject`, `ErrorDocument`)
//! - Error catalog support (`ErrDef`)
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod catalog;
pub mod error_object;

pub use catalog::ErrDef;
pub use error_object::{
    ErrorDocument, ErrorObject, ErrorSource, JSONAPI_MEDIA_TYPE, META_TRACE_ID, META_VIOLATIONS,
    ValidationViolation,
};

/// Attach the request trace id to every error of a document.
#[must_use]
pub fn finalize(mut doc: ErrorDocument, trace_id: Option<&str>) -> ErrorDocument {
    if let Some(tid) = trace_id {
        doc.errors = doc
            .errors
            .into_iter()
            .map(|e| e.with_trace_id(tid))
            .collect();
    }
    doc
}
