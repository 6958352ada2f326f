//! Error taxonomy shared across the query, handle, and bulk-operation components.
//!
//! Each component defines its own narrow error enum; all of them carry an
//! [`ErrorCategory`] so the response builder can map arbitrary component
//! errors onto the wire-level category without knowing their concrete type.

use std::fmt;

/// Stable wire-level error category, attached to every non-success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Malformed or out-of-range input from the caller.
    Validation,
    /// Referenced handle, work item, or comment does not exist (or handle expired).
    NotFound,
    /// Missing or expired credentials.
    Auth,
    /// Credentials valid but insufficient permission.
    AuthForbidden,
    /// Optimistic-concurrency or state conflict (409/412).
    Conflict,
    /// Upstream throttling; may carry a retry-after hint.
    RateLimit,
    /// Upstream returned a 5xx or otherwise failed unexpectedly.
    Upstream,
    /// Transport failure: timeout, DNS, connection reset.
    Network,
    /// Domain-rule violation not covered by the categories above.
    Business,
    /// The LLM sampling collaborator is unavailable or not configured.
    AiUnavailable,
    /// The query shape is not supported (e.g. `ORDER BY` under `WorkItemLinks`).
    QueryUnsupported,
}

impl ErrorCategory {
    /// Short machine-stable code, suitable for programmatic branching by callers.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::Auth => "AUTH",
            ErrorCategory::AuthForbidden => "AUTH_FORBIDDEN",
            ErrorCategory::Conflict => "CONFLICT",
            ErrorCategory::RateLimit => "RATE_LIMIT",
            ErrorCategory::Upstream => "UPSTREAM",
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Business => "BUSINESS",
            ErrorCategory::AiUnavailable => "AI_UNAVAILABLE",
            ErrorCategory::QueryUnsupported => "QUERY_UNSUPPORTED",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Anything that can be classified into a wire-level [`ErrorCategory`].
pub trait Categorized {
    /// Returns the category this error should be reported under.
    fn category(&self) -> ErrorCategory;
}

/// Errors raised by the ADO HTTP client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AdoClientError {
    /// 401 from ADO: missing or expired bearer token.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// 403 from ADO: token valid, operation forbidden.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// 404 from ADO: work item, comment, or resource absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// 409/412 from ADO, typically a revision mismatch.
    #[error("conflict: {0}")]
    Conflict(String),
    /// 429 from ADO. `retry_after` is the `Retry-After` header, in seconds, if present.
    #[error("rate limited{}", retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimit {
        /// Suggested wait time in seconds before retrying, if ADO supplied one.
        retry_after: Option<u64>,
    },
    /// Any 5xx.
    #[error("upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status code returned by ADO.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },
    /// Timeout, DNS failure, or connection reset.
    #[error("network error: {0}")]
    Network(String),
    /// Response body did not parse as the expected shape.
    #[error("failed to decode ADO response: {0}")]
    Decode(String),
    /// Catch-all for errors outside this taxonomy.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Categorized for AdoClientError {
    fn category(&self) -> ErrorCategory {
        match self {
            AdoClientError::Authentication(_) => ErrorCategory::Auth,
            AdoClientError::Forbidden(_) => ErrorCategory::AuthForbidden,
            AdoClientError::NotFound(_) => ErrorCategory::NotFound,
            AdoClientError::Conflict(_) => ErrorCategory::Conflict,
            AdoClientError::RateLimit { .. } => ErrorCategory::RateLimit,
            AdoClientError::Upstream { .. } => ErrorCategory::Upstream,
            AdoClientError::Network(_) => ErrorCategory::Network,
            AdoClientError::Decode(_) => ErrorCategory::Upstream,
            AdoClientError::Other(_) => ErrorCategory::Business,
        }
    }
}

/// Errors raised while resolving or storing query handles.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandleError {
    /// Handle id unknown or past its `expiresAt`.
    #[error("query handle not found or expired: {0}")]
    NotFound(String),
    /// Selector referenced an index outside `selectableIndices`, or was otherwise malformed.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    /// Catch-all.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Categorized for HandleError {
    fn category(&self) -> ErrorCategory {
        match self {
            HandleError::NotFound(_) => ErrorCategory::NotFound,
            HandleError::InvalidSelector(_) => ErrorCategory::Validation,
            HandleError::Other(_) => ErrorCategory::Business,
        }
    }
}

/// Errors raised while executing a WIQL/OData query.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The query shape is not supported server-side (e.g. ordered `WorkItemLinks`).
    #[error("unsupported query: {0}")]
    Unsupported(String),
    /// The WIQL/OData text itself was rejected by ADO.
    #[error("invalid query: {0}")]
    Invalid(String),
    /// Wraps a client-layer failure encountered while executing the query.
    #[error(transparent)]
    Client(#[from] AdoClientError),
}

impl Categorized for QueryError {
    fn category(&self) -> ErrorCategory {
        match self {
            QueryError::Unsupported(_) => ErrorCategory::QueryUnsupported,
            QueryError::Invalid(_) => ErrorCategory::Validation,
            QueryError::Client(e) => e.category(),
        }
    }
}

/// Errors raised while applying a bulk action to one item.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BulkError {
    /// Referenced handle or selector was invalid.
    #[error(transparent)]
    Handle(#[from] HandleError),
    /// The ADO call backing this action failed.
    #[error(transparent)]
    Client(#[from] AdoClientError),
    /// The LLM sampling collaborator was not configured or did not respond.
    #[error("AI sampling unavailable: {0}")]
    AiUnavailable(String),
    /// The LLM's reply did not parse as the expected typed decision.
    #[error("failed to parse AI response: {0}")]
    AiParse(String),
    /// Confidence returned by the AI action fell below the configured minimum.
    #[error("confidence {confidence} below minimum {minimum}")]
    LowConfidence {
        /// Confidence reported by the model, in `[0, 1]`.
        confidence: f64,
        /// Configured minimum acceptable confidence.
        minimum: f64,
    },
    /// The request shape itself was invalid (empty action list, etc.).
    #[error("validation error: {0}")]
    Validation(String),
}

impl Categorized for BulkError {
    fn category(&self) -> ErrorCategory {
        match self {
            BulkError::Handle(e) => e.category(),
            BulkError::Client(e) => e.category(),
            BulkError::AiUnavailable(_) => ErrorCategory::AiUnavailable,
            BulkError::AiParse(_) => ErrorCategory::AiUnavailable,
            BulkError::LowConfidence { .. } => ErrorCategory::Business,
            BulkError::Validation(_) => ErrorCategory::Validation,
        }
    }
}
