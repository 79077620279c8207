//! Error catalog support (static `ErrDef` entries)

use crate::error_object::ErrorObject;
use http::StatusCode;

/// Static error definition from catalog
#[derive(Debug, Clone, Copy)]
pub struct ErrDef {
    pub status: u16,
    pub title: &'static str,
    pub code: &'static str,
}

impl ErrDef {
    /// Convert this error definition into an error object with the given detail
    #[inline]
    pub fn as_error(&self, detail: impl Into<String>) -> ErrorObject {
        // Invalid codes in a catalog entry degrade to 500
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        ErrorObject::new(status, self.title, detail.into()).with_code(self.code)
    }
}
