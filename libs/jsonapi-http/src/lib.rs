//! Axum endpoint for JSON:API Atomic Operations.
//!
//! ```ignore
//! let app = jsonapi_http::router(Arc::new(handler));
//! axum::serve(listener, app).await?;
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use jsonapi_atomic::errors::INVALID_REQUEST;
use jsonapi_atomic::{AtomicHandler, AtomicOperationRequest, AtomicOutcome, DataLayer};
use jsonapi_errors::{ErrorDocument, ErrorObject, finalize};
use tower_http::trace::TraceLayer;

pub mod negotiation;

pub use negotiation::{ATOMIC_CONTENT_TYPE, ATOMIC_EXT, check_accept, check_content_type};

/// Router serving `POST <url_path>` for `handler`.
pub fn router<D>(handler: Arc<AtomicHandler<D>>) -> Router
where
    D: DataLayer + 'static,
{
    let path = handler.config().url_path.clone();
    Router::new()
        .route(&path, post(operations::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

/// Trace id of the request: propagated headers first, then the current span.
#[must_use]
pub fn extract_trace_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-trace-id")
        .or_else(|| headers.get("x-request-id"))
        .or_else(|| headers.get("traceparent"))
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
        .or_else(|| {
            tracing::Span::current()
                .id()
                .map(|id| id.into_u64().to_string())
        })
}

async fn operations<D>(
    State(handler): State<Arc<AtomicHandler<D>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    D: DataLayer + 'static,
{
    match process(&handler, &headers, &body).await {
        Ok(AtomicOutcome::Results(doc)) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(ATOMIC_CONTENT_TYPE),
            )],
            Json(doc),
        )
            .into_response(),
        Ok(AtomicOutcome::NoContent) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => {
            let trace_id = extract_trace_id(&headers);
            finalize(ErrorDocument::from(error), trace_id.as_deref()).into_response()
        }
    }
}

async fn process<D: DataLayer>(
    handler: &AtomicHandler<D>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<AtomicOutcome, ErrorObject> {
    check_content_type(headers)?;
    check_accept(headers)?;
    let request: AtomicOperationRequest = serde_json::from_slice(body).map_err(|e| {
        INVALID_REQUEST
            .as_error(format!("Malformed atomic operations document: {e}"))
            .with_pointer("")
    })?;
    handler.handle(request).await.map_err(|err| {
        tracing::debug!(error = %err, index = ?err.operation_index(), "atomic request failed");
        ErrorObject::from(err)
    })
}
