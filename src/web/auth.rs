//! Optional shared-secret guard for ingestion and admin endpoints

use axum::http::HeaderMap;

use super::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Check the caller's key against the configured one. No configured key means open access.
///
/// The `x-api-key` header is consulted first, then the `ApiKey` body field.
pub fn authorize(
    expected: Option<&str>,
    headers: &HeaderMap,
    body_key: Option<&str>,
    client_ip: &str,
) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(body_key);

    if provided == Some(expected) {
        Ok(())
    } else {
        tracing::warn!("Unauthorized access attempt from {}", client_ip);
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn open_when_no_key_configured() {
        assert!(authorize(None, &HeaderMap::new(), None, "ip").is_ok());
    }

    #[test]
    fn accepts_header_or_body_key() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("s3cret"));
        assert!(authorize(Some("s3cret"), &headers, None, "ip").is_ok());
        assert!(authorize(Some("s3cret"), &HeaderMap::new(), Some("s3cret"), "ip").is_ok());
    }

    #[test]
    fn rejects_missing_or_wrong_key() {
        assert!(matches!(
            authorize(Some("s3cret"), &HeaderMap::new(), None, "ip"),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(Some("s3cret"), &HeaderMap::new(), Some("guess"), "ip"),
            Err(ApiError::Unauthorized)
        ));
    }
}
