//! Thin [`ToolDyn`] handlers translating MCP tool-call arguments into calls
//! against the query executor, handle service, and bulk engine.
//!
//! Every tool returns `200`-shaped output: a serialized
//! [`adomcp_types::Envelope`]. Malformed input and upstream/business failures
//! both surface as a `success: false` envelope rather than a transport-level
//! [`ToolError`], so a calling agent always gets a structured result to
//! reason about. Only a handful of tools are wired here to demonstrate the
//! pattern; the remaining tool surface named in the catalog is not built.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use adomcp_bulk::BulkEngine;
use adomcp_handles::QueryHandleService;
use adomcp_query::QueryExecutor;
use adomcp_tool::{ToolDyn, ToolError};
use adomcp_types::{Action, ErrorCategory, Envelope, ItemSelector, StopOnError};
use serde::Deserialize;
use serde_json::Value;

fn invalid_input(err: impl std::fmt::Display) -> Value {
    serde_json::to_value(Envelope::<Value>::err_category(ErrorCategory::Validation, err.to_string()))
        .unwrap_or(Value::Null)
}

/// `wit-get-work-items-by-query-wiql`: runs a WIQL query and materializes a query handle.
pub struct QueryWorkItemsTool {
    executor: Arc<QueryExecutor>,
}

impl QueryWorkItemsTool {
    /// Wraps a query executor as an MCP tool.
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self { executor }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryWorkItemsInput {
    query: String,
    #[serde(default)]
    include_fields: Vec<String>,
    top: Option<usize>,
    skip: Option<usize>,
    #[serde(default)]
    include_substantive_change: bool,
    substantive_change_history_count: Option<usize>,
    #[serde(default)]
    filter_by_patterns: Vec<String>,
    filter_by_days_inactive_min: Option<i64>,
    filter_by_days_inactive_max: Option<i64>,
    #[serde(default)]
    filter_by_missing_description: bool,
    #[serde(default)]
    filter_by_missing_acceptance_criteria: bool,
    #[serde(default)]
    fetch_full_packages: bool,
    #[serde(default)]
    preview_count: usize,
}

impl ToolDyn for QueryWorkItemsTool {
    fn name(&self) -> &str {
        "wit-get-work-items-by-query-wiql"
    }

    fn description(&self) -> &str {
        "Runs a WIQL query against Azure DevOps and returns a query handle plus a bounded preview of matching work items."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {"type": "string", "description": "WIQL query text"},
                "includeFields": {"type": "array", "items": {"type": "string"}},
                "top": {"type": "integer"},
                "skip": {"type": "integer"},
                "includeSubstantiveChange": {"type": "boolean"},
                "substantiveChangeHistoryCount": {"type": "integer"},
                "filterByPatterns": {"type": "array", "items": {"type": "string"}},
                "filterByDaysInactiveMin": {"type": "integer"},
                "filterByDaysInactiveMax": {"type": "integer"},
                "filterByMissingDescription": {"type": "boolean"},
                "filterByMissingAcceptanceCriteria": {"type": "boolean"},
                "fetchFullPackages": {"type": "boolean"},
                "previewCount": {"type": "integer"}
            }
        })
    }

    fn call(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let parsed: QueryWorkItemsInput = match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Ok(invalid_input(e)),
            };

            let options = adomcp_query::QueryOptions {
                include_fields: parsed.include_fields,
                top: parsed.top,
                skip: parsed.skip,
                include_substantive_change: parsed.include_substantive_change,
                substantive_change_history_count: parsed.substantive_change_history_count,
                filter_by_patterns: parsed.filter_by_patterns,
                filter_by_days_inactive_min: parsed.filter_by_days_inactive_min,
                filter_by_days_inactive_max: parsed.filter_by_days_inactive_max,
                filter_by_missing_description: parsed.filter_by_missing_description,
                filter_by_missing_acceptance_criteria: parsed.filter_by_missing_acceptance_criteria,
                fetch_full_packages: parsed.fetch_full_packages,
                handle_ttl: None,
                fan_out: 16,
                preview_count: parsed.preview_count,
            };

            match self.executor.execute_wiql(&parsed.query, options).await {
                Ok(result) => {
                    let mut envelope = Envelope::ok(serde_json::json!({
                        "handleId": result.handle_id,
                        "totalItems": result.total_items,
                        "preview": result.preview,
                        "hasMore": result.has_more,
                    }));
                    for warning in result.warnings {
                        envelope = envelope.with_warning(warning);
                    }
                    Ok(serde_json::to_value(envelope).unwrap_or(Value::Null))
                }
                Err(err) => Ok(serde_json::to_value(Envelope::<Value>::err(&err, err.to_string())).unwrap_or(Value::Null)),
            }
        })
    }
}

/// `wit-get-query-handle-info`: previews a handle's items, optionally scoped
/// by a selector, without mutating anything.
pub struct DescribeQueryHandleTool {
    handles: Arc<QueryHandleService>,
}

impl DescribeQueryHandleTool {
    /// Wraps a handle service as an MCP tool.
    pub fn new(handles: Arc<QueryHandleService>) -> Self {
        Self { handles }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeQueryHandleInput {
    handle_id: String,
    #[serde(default)]
    preview_count: usize,
    selector: Option<ItemSelector>,
}

impl ToolDyn for DescribeQueryHandleTool {
    fn name(&self) -> &str {
        "wit-get-query-handle-info"
    }

    fn description(&self) -> &str {
        "Describes a previously created query handle: total item count, selection aggregates, and a bounded preview."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["handleId"],
            "properties": {
                "handleId": {"type": "string"},
                "previewCount": {"type": "integer"},
                "selector": {"type": "object", "description": "ItemSelector: {kind: \"all\"} | {kind: \"indices\", 0: [..]} | {kind: \"criteria\", ...}"}
            }
        })
    }

    fn call(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let parsed: DescribeQueryHandleInput = match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Ok(invalid_input(e)),
            };
            let preview_count = if parsed.preview_count == 0 { 10 } else { parsed.preview_count };

            match self
                .handles
                .describe(&parsed.handle_id, preview_count, parsed.selector.as_ref())
                .await
            {
                Ok(description) => {
                    let envelope = Envelope::ok(serde_json::json!({
                        "handleId": description.handle_id,
                        "totalItems": description.total_items,
                        "selectedItems": description.selected_items,
                        "expiresAt": description.expires_at,
                        "hasMore": description.has_more,
                        "selection": description.selection,
                        "preview": description.preview,
                    }));
                    Ok(serde_json::to_value(envelope).unwrap_or(Value::Null))
                }
                Err(err) => Ok(serde_json::to_value(Envelope::<Value>::err(&err, err.to_string())).unwrap_or(Value::Null)),
            }
        })
    }
}

/// `wit-select-items-from-query-handle`: resolves a selector against a query
/// handle and returns the matching work item ids, without mutating anything.
pub struct SelectItemsFromQueryHandleTool {
    handles: Arc<QueryHandleService>,
}

impl SelectItemsFromQueryHandleTool {
    /// Wraps a handle service as an MCP tool.
    pub fn new(handles: Arc<QueryHandleService>) -> Self {
        Self { handles }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectItemsFromQueryHandleInput {
    handle_id: String,
    selector: ItemSelector,
}

impl ToolDyn for SelectItemsFromQueryHandleTool {
    fn name(&self) -> &str {
        "wit-select-items-from-query-handle"
    }

    fn description(&self) -> &str {
        "Resolves a selector against a query handle and returns the matching work item ids and indices, without mutating anything."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["handleId", "selector"],
            "properties": {
                "handleId": {"type": "string"},
                "selector": {"type": "object", "description": "ItemSelector: {kind: \"all\"} | {kind: \"indices\", 0: [..]} | {kind: \"criteria\", ...}"}
            }
        })
    }

    fn call(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let parsed: SelectItemsFromQueryHandleInput = match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Ok(invalid_input(e)),
            };

            match self.handles.resolve(&parsed.handle_id, &parsed.selector).await {
                Ok(resolved) => {
                    let items: Vec<Value> = resolved
                        .into_iter()
                        .map(|(index, id)| serde_json::json!({ "index": index, "id": id }))
                        .collect();
                    let envelope = Envelope::ok(serde_json::json!({
                        "handleId": parsed.handle_id,
                        "selectedCount": items.len(),
                        "items": items,
                    }));
                    Ok(serde_json::to_value(envelope).unwrap_or(Value::Null))
                }
                Err(err) => Ok(serde_json::to_value(Envelope::<Value>::err(&err, err.to_string())).unwrap_or(Value::Null)),
            }
        })
    }
}

/// `wit-bulk-operation`: applies a typed action sequence to a selector-resolved
/// subset of a query handle's items.
pub struct BulkExecuteTool {
    engine: Arc<BulkEngine>,
}

impl BulkExecuteTool {
    /// Wraps a bulk engine as an MCP tool.
    pub fn new(engine: Arc<BulkEngine>) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkExecuteInput {
    handle_id: String,
    selector: ItemSelector,
    actions: Vec<Action>,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    stop_on_error: StopOnError,
    #[serde(default)]
    max_preview_items: usize,
    per_item_concurrency: Option<usize>,
}

impl ToolDyn for BulkExecuteTool {
    fn name(&self) -> &str {
        "wit-bulk-operation"
    }

    fn description(&self) -> &str {
        "Applies a sequence of typed actions (update, comment, tag, assign, move, remove, AI-assisted enrichment) to the items a selector resolves to within a query handle."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["handleId", "selector", "actions"],
            "properties": {
                "handleId": {"type": "string"},
                "selector": {"type": "object"},
                "actions": {"type": "array", "items": {"type": "object"}},
                "dryRun": {"type": "boolean"},
                "stopOnError": {"type": "string", "enum": ["per_item", "all", "never"]},
                "maxPreviewItems": {"type": "integer"},
                "perItemConcurrency": {"type": "integer"}
            }
        })
    }

    fn call(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let parsed: BulkExecuteInput = match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Ok(invalid_input(e)),
            };

            let mut options = adomcp_bulk::BulkOptions {
                dry_run: parsed.dry_run,
                stop_on_error: parsed.stop_on_error,
                ..Default::default()
            };
            if parsed.max_preview_items > 0 {
                options.max_preview_items = parsed.max_preview_items;
            }
            options.per_item_concurrency = parsed.per_item_concurrency;

            match self.engine.execute(&parsed.handle_id, parsed.selector, parsed.actions, options).await {
                Ok(result) => {
                    let item_outcomes: Vec<Value> = result
                        .item_outcomes
                        .iter()
                        .map(|item| {
                            let actions: Vec<Value> = item
                                .actions
                                .iter()
                                .map(|a| {
                                    serde_json::json!({
                                        "kind": a.kind,
                                        "outcome": a.outcome,
                                        "errorCategory": a.error_category.map(ErrorCategory::code),
                                        "reason": a.reason,
                                    })
                                })
                                .collect();
                            serde_json::json!({ "index": item.index, "id": item.id, "actions": actions })
                        })
                        .collect();

                    let mut envelope = Envelope::ok(serde_json::json!({
                        "itemsSelected": result.items_selected,
                        "actionsCompleted": result.actions_completed,
                        "success": result.success,
                        "itemOutcomes": item_outcomes,
                        "preview": result.preview,
                    }));
                    envelope.success = result.success;
                    envelope.errors = result.errors;
                    for warning in result.warnings {
                        envelope = envelope.with_warning(warning);
                    }
                    Ok(serde_json::to_value(envelope).unwrap_or(Value::Null))
                }
                Err(err) => Ok(serde_json::to_value(Envelope::<Value>::err(&err, err.to_string())).unwrap_or(Value::Null)),
            }
        })
    }
}

/// `wit-undo-bulk-operation`: replays a handle's recorded inverses to restore
/// prior state, optionally scoped to a selector.
pub struct BulkUndoTool {
    engine: Arc<BulkEngine>,
}

impl BulkUndoTool {
    /// Wraps a bulk engine as an MCP tool.
    pub fn new(engine: Arc<BulkEngine>) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkUndoInput {
    handle_id: String,
    selector: Option<ItemSelector>,
}

impl ToolDyn for BulkUndoTool {
    fn name(&self) -> &str {
        "wit-undo-bulk-operation"
    }

    fn description(&self) -> &str {
        "Undoes previously applied bulk actions for a query handle by replaying their recorded inverses, newest first."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["handleId"],
            "properties": {
                "handleId": {"type": "string"},
                "selector": {"type": "object"}
            }
        })
    }

    fn call(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let parsed: BulkUndoInput = match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Ok(invalid_input(e)),
            };

            match self.engine.undo(&parsed.handle_id, parsed.selector).await {
                Ok(result) => {
                    let item_results: Vec<Value> = result
                        .item_results
                        .iter()
                        .map(|r| {
                            serde_json::json!({
                                "id": r.id,
                                "sequenceNo": r.sequence_no,
                                "kind": r.kind,
                                "outcome": r.outcome,
                                "error": r.error,
                            })
                        })
                        .collect();

                    let mut envelope = Envelope::ok(serde_json::json!({
                        "handleId": result.handle_id,
                        "attempted": result.attempted,
                        "undone": result.undone,
                        "failed": result.failed,
                        "itemResults": item_results,
                    }));
                    envelope.success = result.failed == 0;
                    envelope.errors = result.errors;
                    Ok(serde_json::to_value(envelope).unwrap_or(Value::Null))
                }
                Err(err) => Ok(serde_json::to_value(Envelope::<Value>::err(&err, err.to_string())).unwrap_or(Value::Null)),
            }
        })
    }
}
