//! Media-type negotiation for the atomic extension.

use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE};
use jsonapi_errors::{ErrDef, ErrorObject, JSONAPI_MEDIA_TYPE};
use mime::Mime;

pub const ATOMIC_EXT: &str = "https://jsonapi.org/ext/atomic";

/// Content type of a successful atomic response.
pub const ATOMIC_CONTENT_TYPE: &str =
    "application/vnd.api+json; ext=\"https://jsonapi.org/ext/atomic\"";

pub const UNSUPPORTED_MEDIA_TYPE: ErrDef = ErrDef {
    status: 415,
    title: "Unsupported Media Type",
    code: "atomic.unsupported_media_type",
};

pub const NOT_ACCEPTABLE: ErrDef = ErrDef {
    status: 406,
    title: "Not Acceptable",
    code: "atomic.not_acceptable",
};

fn is_jsonapi(media: &Mime) -> bool {
    media.essence_str() == JSONAPI_MEDIA_TYPE
}

/// Every parameter (besides `q` in Accept) is an `ext` listing the atomic extension.
fn only_atomic_ext(media: &Mime) -> bool {
    media.params().all(|(name, value)| match name.as_str() {
        "q" => true,
        "ext" => value
            .as_str()
            .trim_matches('"')
            .split_whitespace()
            .any(|ext| ext == ATOMIC_EXT),
        _ => false,
    })
}

/// Check the request `Content-Type`; a missing header is accepted.
///
/// # Errors
/// Returns a 415 error object for any other media type or parameter.
pub fn check_content_type(headers: &HeaderMap) -> Result<(), ErrorObject> {
    let Some(raw) = headers.get(CONTENT_TYPE) else {
        return Ok(());
    };
    let media = raw.to_str().ok().and_then(|v| v.parse::<Mime>().ok());
    match media {
        Some(media) if is_jsonapi(&media) && media.get_param("q").is_none() && only_atomic_ext(&media) => {
            Ok(())
        }
        _ => Err(UNSUPPORTED_MEDIA_TYPE
            .as_error(format!("Content-Type must be {ATOMIC_CONTENT_TYPE}"))
            .with_header(CONTENT_TYPE.as_str())),
    }
}

/// Check `Accept`: when it lists the JSON:API media type, at least one
/// instance must be usable with the atomic extension.
///
/// # Errors
/// Returns a 406 error object when every JSON:API instance is unusable.
pub fn check_accept(headers: &HeaderMap) -> Result<(), ErrorObject> {
    let ranges: Vec<Mime> = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|range| range.trim().parse::<Mime>().ok())
        .filter(is_jsonapi)
        .collect();
    if ranges.is_empty() || ranges.iter().any(only_atomic_ext) {
        Ok(())
    } else {
        Err(NOT_ACCEPTABLE
            .as_error(format!(
                "Accept must allow {JSONAPI_MEDIA_TYPE} without parameters other than ext=\"{ATOMIC_EXT}\""
            ))
            .with_header(ACCEPT.as_str()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(name: http::HeaderName, value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_static(value));
        map
    }

    #[test]
    fn content_type_accepts_plain_and_atomic_ext() {
        assert!(check_content_type(&HeaderMap::new()).is_ok());
        assert!(check_content_type(&headers(CONTENT_TYPE, "application/vnd.api+json")).is_ok());
        assert!(check_content_type(&headers(CONTENT_TYPE, ATOMIC_CONTENT_TYPE)).is_ok());
    }

    #[test]
    fn content_type_rejects_other_media_and_params() {
        for value in [
            "application/json",
            "application/vnd.api+json; charset=utf-8",
            "application/vnd.api+json; ext=\"https://example.com/ext\"",
        ] {
            let err = check_content_type(&headers(CONTENT_TYPE, value)).unwrap_err();
            assert_eq!(err.status, http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }
    }

    #[test]
    fn accept_requires_one_usable_instance() {
        assert!(check_accept(&headers(ACCEPT, "*/*")).is_ok());
        assert!(check_accept(&headers(ACCEPT, "application/vnd.api+json")).is_ok());
        assert!(
            check_accept(&headers(
                ACCEPT,
                "application/vnd.api+json; profile=\"x\", application/vnd.api+json"
            ))
            .is_ok()
        );

        let err = check_accept(&headers(ACCEPT, "application/vnd.api+json; profile=\"x\""))
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::NOT_ACCEPTABLE);
    }
}
