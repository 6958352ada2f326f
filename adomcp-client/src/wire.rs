//! Wire-level request/response shapes for the ADO work-item REST surface.
//!
//! These mirror ADO's JSON shapes closely; translation into the domain
//! types in `adomcp-types` happens in `adomcp-query` and `adomcp-analyzer`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Body of a WIQL query POST.
#[derive(Debug, Serialize)]
pub struct WiqlRequest {
    /// The query text, verbatim.
    pub query: String,
}

/// One row of a WIQL query result (flat queries only carry `id`; hierarchy
/// queries additionally carry `source`/`target` but flat `id` is always
/// present on the leaf work item).
#[derive(Debug, Deserialize)]
pub struct WiqlWorkItemRef {
    /// Work item id.
    pub id: i64,
}

/// Response body of a WIQL query.
#[derive(Debug, Deserialize)]
pub struct WiqlResponse {
    /// Flat-query result rows.
    #[serde(default, rename = "workItems")]
    pub work_items: Vec<WiqlWorkItemRef>,
    /// Hierarchy-query result rows (parent/child link pairs).
    #[serde(default, rename = "workItemRelations")]
    pub work_item_relations: Vec<WiqlRelationRow>,
}

/// One relation row from a `WorkItemLinks` hierarchy query.
#[derive(Debug, Deserialize)]
pub struct WiqlRelationRow {
    /// Relation type, empty string for the root row.
    #[serde(default)]
    pub rel: Option<String>,
    /// Source end of the relation.
    pub source: Option<WiqlWorkItemRef>,
    /// Target end of the relation.
    pub target: WiqlWorkItemRef,
}

/// One work item as returned by a batch field fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemDto {
    /// Work item id.
    pub id: i64,
    /// Revision number at fetch time.
    pub rev: i64,
    /// Field reference name to raw JSON value.
    pub fields: HashMap<String, Value>,
    /// Relations, present only when `$expand=relations` or `$expand=all`.
    #[serde(default)]
    pub relations: Vec<WorkItemRelationDto>,
}

/// One relation entry as returned by ADO.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemRelationDto {
    /// Relation type string.
    pub rel: String,
    /// Absolute URL of the related resource.
    pub url: String,
    /// Relation-specific attributes.
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// Body of a batch field fetch response.
#[derive(Debug, Deserialize)]
pub struct WorkItemBatchResponse {
    /// Work items in the batch, order not guaranteed to match the request.
    pub value: Vec<WorkItemDto>,
}

/// One revision of a work item, as returned by the revisions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemRevisionDto {
    /// Revision number (monotonic per work item).
    pub rev: i64,
    /// Field values at this revision.
    pub fields: HashMap<String, Value>,
}

/// Body of a revisions list response.
#[derive(Debug, Deserialize)]
pub struct RevisionsResponse {
    /// Revisions, oldest first (ADO's native order).
    pub value: Vec<WorkItemRevisionDto>,
}

/// One JSON-Patch operation, as sent to ADO's update endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PatchOperation {
    /// `"add"`, `"replace"`, `"remove"`, or `"test"`.
    pub op: &'static str,
    /// Target path, e.g. `/fields/System.Title` or `/rev`.
    pub path: String,
    /// New value; omitted for `"remove"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    /// Builds a `test` op asserting the current `/rev`, used for optimistic concurrency.
    pub fn test_rev(rev: i64) -> Self {
        PatchOperation {
            op: "test",
            path: "/rev".to_string(),
            value: Some(Value::from(rev)),
        }
    }

    /// Builds a field-replace (or add, for a previously-empty field) op.
    pub fn replace_field(field: &str, value: Value) -> Self {
        PatchOperation {
            op: "add",
            path: format!("/fields/{field}"),
            value: Some(value),
        }
    }

    /// Builds a field-remove op.
    pub fn remove_field(field: &str) -> Self {
        PatchOperation {
            op: "remove",
            path: format!("/fields/{field}"),
            value: None,
        }
    }
}

/// Body of a new-comment POST.
#[derive(Debug, Serialize)]
pub struct CommentRequest {
    /// Comment text (supports ADO's restricted HTML subset).
    pub text: String,
}

/// A single comment as returned by ADO.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentDto {
    /// Comment id, used for deletion (undo).
    pub id: i64,
    /// Comment text as stored.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rev_targets_rev_path() {
        let op = PatchOperation::test_rev(7);
        assert_eq!(op.op, "test");
        assert_eq!(op.path, "/rev");
        assert_eq!(op.value, Some(Value::from(7)));
    }

    #[test]
    fn replace_field_targets_fields_prefix() {
        let op = PatchOperation::replace_field("System.Title", Value::from("new title"));
        assert_eq!(op.path, "/fields/System.Title");
    }
}
