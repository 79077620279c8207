//! JSON:API error objects and error documents (pure data model, no HTTP framework dependencies)
//!
//! See <https://jsonapi.org/format/#error-objects>.

use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Media type of JSON:API documents.
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Meta key holding the trace id of the failed request.
pub const META_TRACE_ID: &str = "trace_id";

/// Meta key holding per-field validation violations.
pub const META_VIOLATIONS: &str = "errors";

/// JSON:API renders `status` as a string ("422"), not a number.
#[allow(clippy::trivially_copy_pass_by_ref)] // serde requires &T signature
fn serialize_status_code<S>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(status.as_str())
}

fn deserialize_status_code<'de, D>(deserializer: D) -> Result<StatusCode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let code = raw.parse::<u16>().map_err(serde::de::Error::custom)?;
    StatusCode::from_u16(code).map_err(serde::de::Error::custom)
}

/// Location of the request member that caused an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    /// JSON pointer (RFC 6901) into the request document, e.g. `/atomic:operations/add`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// Query parameter that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Request header that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

/// A single JSON:API error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct ErrorObject {
    /// Unique identifier for this occurrence of the problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The HTTP status code applicable to this problem, rendered as a string.
    #[serde(
        serialize_with = "serialize_status_code",
        deserialize_with = "deserialize_status_code"
    )]
    pub status: StatusCode,
    /// Application-specific error code.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    /// Short, human-readable summary of the problem type.
    pub title: String,
    /// Human-readable explanation specific to this occurrence.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    /// Non-standard meta-information (trace id, validation violations, operation index).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Individual validation violation for a specific field or property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationViolation {
    /// field path, e.g. "data.attributes.name"
    pub field: String,
    /// Human-readable message describing the validation error
    pub message: String,
    /// Optional machine-readable error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ValidationViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("field".to_owned(), Value::String(self.field.clone()));
        obj.insert("message".to_owned(), Value::String(self.message.clone()));
        if let Some(code) = &self.code {
            obj.insert("code".to_owned(), Value::String(code.clone()));
        }
        Value::Object(obj)
    }
}

impl ErrorObject {
    /// Create a new error object with the given status, title, and detail.
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: None,
            status,
            code: String::new(),
            title: title.into(),
            detail: detail.into(),
            source: None,
            meta: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.source.get_or_insert_with(ErrorSource::default).pointer = Some(pointer.into());
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.source.get_or_insert_with(ErrorSource::default).parameter = Some(parameter.into());
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.source.get_or_insert_with(ErrorSource::default).header = Some(header.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_trace_id(self, id: impl Into<String>) -> Self {
        self.with_meta(META_TRACE_ID, Value::String(id.into()))
    }

    pub fn with_violations(self, violations: &[ValidationViolation]) -> Self {
        let list = violations.iter().map(ValidationViolation::to_value).collect();
        self.with_meta(META_VIOLATIONS, Value::Array(list))
    }

    /// The JSON pointer of this error, if any.
    #[must_use]
    pub fn pointer(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.pointer.as_deref())
    }

    #[must_use]
    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.as_ref().and_then(|m| m.get(key))
    }
}

/// Top-level JSON:API error document: `{"errors": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

impl ErrorDocument {
    /// HTTP status of the document: the status of its first error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.errors
            .first()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, |e| e.status)
    }
}

impl From<ErrorObject> for ErrorDocument {
    fn from(error: ErrorObject) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Axum integration: make error documents directly usable as a response
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorDocument {
    fn into_response(self) -> axum::response::Response {
        use axum::http::HeaderValue;

        let status = self.status();
        if status.is_server_error() {
            tracing::debug!(status = %status, "rendering server error document");
        }
        let mut resp = axum::Json(self).into_response();
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static(JSONAPI_MEDIA_TYPE),
        );
        resp
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorObject {
    fn into_response(self) -> axum::response::Response {
        ErrorDocument::from(self).into_response()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn error_object_builder_pattern() {
        let e = ErrorObject::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Validation Failed",
            "Input validation errors",
        )
        .with_code("atomic.validation")
        .with_pointer("/atomic:operations/add")
        .with_trace_id("req-456")
        .with_violations(&[ValidationViolation::new(
            "data.attributes.name",
            "field required",
        )]);

        assert_eq!(e.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(e.code, "atomic.validation");
        assert_eq!(e.pointer(), Some("/atomic:operations/add"));
        assert_eq!(
            e.meta_value(META_TRACE_ID),
            Some(&Value::String("req-456".to_owned()))
        );
        let violations = e.meta_value(META_VIOLATIONS).and_then(Value::as_array);
        assert_eq!(violations.map(Vec::len), Some(1));
    }

    #[test]
    fn error_object_serializes_status_as_string() {
        let e = ErrorObject::new(StatusCode::NOT_FOUND, "Not Found", "Resource not found");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["status"], "404");
        assert!(json.get("source").is_none());
        assert!(json.get("meta").is_none());
    }

    #[test]
    fn error_object_deserializes_status_from_string() {
        let json = r#"{"status":"409","title":"Conflict","detail":"taken","source":{"pointer":"/data/id"}}"#;
        let e: ErrorObject = serde_json::from_str(json).unwrap();
        assert_eq!(e.status, StatusCode::CONFLICT);
        assert_eq!(e.pointer(), Some("/data/id"));
    }

    #[test]
    fn document_status_comes_from_first_error() {
        let doc = ErrorDocument {
            errors: vec![
                ErrorObject::new(StatusCode::BAD_REQUEST, "Bad Request", "a"),
                ErrorObject::new(StatusCode::CONFLICT, "Conflict", "b"),
            ],
        };
        assert_eq!(doc.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorDocument { errors: vec![] }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
