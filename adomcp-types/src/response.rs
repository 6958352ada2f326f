//! Canonical response envelope returned by every tool call.

use crate::error::{Categorized, ErrorCategory};
use serde::{Deserialize, Serialize};

/// `{success, data, metadata, errors, warnings}`, the shape every tool
/// handler returns regardless of which component produced the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// False if any `errors` entry represents a hard failure of the whole call.
    pub success: bool,
    /// Payload on success; `None` when `success` is false.
    pub data: Option<T>,
    /// Free-form metadata (counts, handle ids, category codes).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Human-readable error messages.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Human-readable warnings that do not affect `success`.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl<T> Envelope<T> {
    /// Builds a successful envelope with no warnings or metadata.
    pub fn ok(data: T) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            metadata: serde_json::Value::Null,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Attaches metadata to an existing envelope.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attaches a warning, leaving `success` untouched.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Builds a failed envelope from any categorized error.
    pub fn err(error: &impl Categorized, message: impl Into<String>) -> Self {
        Envelope {
            success: false,
            data: None,
            metadata: serde_json::json!({ "errorCategory": error.category().code() }),
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }

    /// Builds a failed envelope directly from a category and message, when no
    /// concrete error value is at hand (e.g. input validation at the transport edge).
    pub fn err_category(category: ErrorCategory, message: impl Into<String>) -> Self {
        Envelope {
            success: false,
            data: None,
            metadata: serde_json::json!({ "errorCategory": category.code() }),
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }
}
