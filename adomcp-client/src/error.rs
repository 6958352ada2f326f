//! Mapping from HTTP status codes and transport failures to [`AdoClientError`].

use adomcp_types::AdoClientError;

/// Map an ADO REST response status and body to an [`AdoClientError`].
///
/// Reference: <https://learn.microsoft.com/en-us/rest/api/azure/devops/>
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> AdoClientError {
    match status.as_u16() {
        401 => AdoClientError::Authentication(body.to_string()),
        403 => AdoClientError::Forbidden(body.to_string()),
        404 => AdoClientError::NotFound(body.to_string()),
        409 | 412 => AdoClientError::Conflict(body.to_string()),
        429 => AdoClientError::RateLimit { retry_after },
        500..=599 => AdoClientError::Upstream {
            status: status.as_u16(),
            message: body.to_string(),
        },
        _ => AdoClientError::Upstream {
            status: status.as_u16(),
            message: body.to_string(),
        },
    }
}

/// Map a [`reqwest::Error`] (one that never reached a response) to an [`AdoClientError`].
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> AdoClientError {
    if err.is_timeout() {
        AdoClientError::Network(format!("request timed out: {err}"))
    } else {
        AdoClientError::Network(err.to_string())
    }
}

/// Parse the `Retry-After` header, if present, as whole seconds.
pub(crate) fn retry_after_seconds(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
