//! Applies one [`Action`] to one work item: fetch pre-image, compose patch,
//! execute with conflict retry, derive the inverse.

use std::collections::HashMap;
use std::sync::Arc;

use adomcp_client::wire::{CommentRequest, PatchOperation, WorkItemDto};
use adomcp_client::AdoClient;
use adomcp_types::{Action, AdoClientError, BulkError, FieldValue};
use serde_json::Value;

use crate::sampling::{AiDecision, LlmSamplingChannel, SamplingRequest};

/// Result of applying one action to one item.
pub struct ApplyResult {
    /// The payload actually sent (for the operation record).
    pub payload: Value,
    /// The payload that would undo this action, if derivable.
    pub inverse_payload: Option<Value>,
    /// True if this result can never be undone regardless of `inverse_payload`.
    pub irreversible: bool,
    /// True if the underlying PATCH hit a 409/412 and succeeded only after
    /// one re-fetch-and-retry, per the optimistic-concurrency contract.
    pub conflict_retried: bool,
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Number(n) => serde_json::json!(n),
        FieldValue::String(s) => Value::String(s.clone()),
        FieldValue::Identity(id) => serde_json::json!({
            "displayName": id.display_name,
            "uniqueName": id.unique_name,
            "id": id.id,
        }),
    }
}

pub(crate) async fn fetch_current(client: &AdoClient, id: i64, fields: &[String]) -> Result<WorkItemDto, AdoClientError> {
    let path = if fields.is_empty() {
        format!("wit/workitems/{id}")
    } else {
        format!("wit/workitems/{id}?fields={}", fields.join(","))
    };
    client.get(&path).await
}

/// Applies `action` to item `id`, retrying once on conflict by re-fetching
/// the current revision. `sampling` is required only for AI-assisted actions.
pub async fn apply(
    client: &AdoClient,
    id: i64,
    action: &Action,
    min_confidence: f64,
    sampling: Option<&Arc<dyn LlmSamplingChannel>>,
) -> Result<ApplyResult, BulkError> {
    match action {
        Action::Update { fields } => apply_update(client, id, fields).await,
        Action::Comment { text } => apply_comment(client, id, text).await,
        Action::AddTag { tags } => apply_tag_change(client, id, tags, true).await,
        Action::RemoveTag { tags } => apply_tag_change(client, id, tags, false).await,
        Action::Assign { assign_to } => apply_assign(client, id, assign_to.as_deref()).await,
        Action::MoveIteration { target_iteration_path, .. } => apply_move_iteration(client, id, target_iteration_path).await,
        Action::Remove { reason, destroy } => apply_remove(client, id, reason, *destroy).await,
        Action::EnhanceDescriptions { style } => {
            apply_ai_enhance_descriptions(client, id, style.as_deref(), min_confidence, sampling).await
        }
        Action::AssignStoryPoints {
            scale,
            overwrite_existing,
            ..
        } => apply_ai_story_points(client, id, scale.as_deref(), *overwrite_existing, min_confidence, sampling).await,
        Action::Analyze { analysis_types } => apply_ai_analyze(client, id, analysis_types, sampling).await,
    }
}

/// Applies `ops` under an optimistic-concurrency test of `rev`, retrying
/// once against a freshly fetched revision on 409/412. Returns whether the
/// retry path was taken.
pub(crate) async fn patch_with_rev_retry(client: &AdoClient, id: i64, rev: i64, ops: Vec<PatchOperation>) -> Result<bool, AdoClientError> {
    let mut ops = ops;
    ops.insert(0, PatchOperation::test_rev(rev));
    let path = format!("wit/workitems/{id}");
    match client.patch::<_, Value>(&path, &ops, None).await {
        Ok(_) => Ok(false),
        Err(AdoClientError::Conflict(_)) => {
            let refreshed: WorkItemDto = client.get(&format!("wit/workitems/{id}")).await?;
            let mut retried_ops = ops;
            retried_ops[0] = PatchOperation::test_rev(refreshed.rev);
            client.patch::<_, Value>(&path, &retried_ops, None).await.map(|_| true)
        }
        Err(err) => Err(err),
    }
}

/// Deletes one comment, used to undo an applied `comment` action.
pub(crate) async fn delete_comment(client: &AdoClient, id: i64, comment_id: i64) -> Result<(), AdoClientError> {
    let path = format!("wit/workitems/{id}/comments/{comment_id}");
    let _: Value = client.delete(&path).await?;
    Ok(())
}

/// Restores a soft-removed item from the recycle bin and, if known, its
/// prior `System.State`. Used to undo a non-destructive `remove` action.
pub(crate) async fn restore_removed(client: &AdoClient, id: i64, previous_state: Option<&str>) -> Result<(), AdoClientError> {
    let path = format!("wit/recyclebin/{id}");
    let body = serde_json::json!({ "isDeleted": false });
    let _: Value = client.patch(&path, &body, None).await?;

    if let Some(state) = previous_state {
        let current = fetch_current(client, id, &["System.State".to_string()]).await?;
        let ops = vec![PatchOperation::replace_field("System.State", Value::String(state.to_string()))];
        patch_with_rev_retry(client, id, current.rev, ops).await?;
    }
    Ok(())
}

/// Replays a set of raw JSON-Patch operations (as recorded in an inverse
/// payload) against the item's current revision. Used by undo for
/// `update`-shaped inverses.
pub(crate) async fn apply_raw_ops(client: &AdoClient, id: i64, ops: Vec<PatchOperation>) -> Result<(), AdoClientError> {
    let current = fetch_current(client, id, &[]).await?;
    patch_with_rev_retry(client, id, current.rev, ops).await.map(|_| ())
}

async fn apply_update(client: &AdoClient, id: i64, fields: &HashMap<String, FieldValue>) -> Result<ApplyResult, BulkError> {
    let field_names: Vec<String> = fields.keys().cloned().collect();
    let current = fetch_current(client, id, &field_names).await?;

    let mut ops = Vec::new();
    let mut inverse_ops = Vec::new();
    for (field, value) in fields {
        ops.push(PatchOperation::replace_field(field, field_value_to_json(value)));
        match current.fields.get(field) {
            Some(previous) => inverse_ops.push(PatchOperation::replace_field(field, previous.clone())),
            None => inverse_ops.push(PatchOperation::remove_field(field)),
        }
    }

    let conflict_retried = patch_with_rev_retry(client, id, current.rev, ops.clone()).await?;

    Ok(ApplyResult {
        payload: serde_json::json!({ "fields": fields }),
        inverse_payload: Some(serde_json::json!({ "ops": inverse_ops.iter().map(|op| serde_json::json!({"op": op.op, "path": op.path, "value": op.value})).collect::<Vec<_>>() })),
        irreversible: false,
        conflict_retried,
    })
}

async fn apply_comment(client: &AdoClient, id: i64, text: &str) -> Result<ApplyResult, BulkError> {
    let path = format!("wit/workitems/{id}/comments");
    let comment: adomcp_client::wire::CommentDto = client
        .post(&path, &CommentRequest { text: text.to_string() })
        .await?;
    Ok(ApplyResult {
        payload: serde_json::json!({ "text": text }),
        inverse_payload: Some(serde_json::json!({ "deleteCommentId": comment.id })),
        irreversible: false,
        conflict_retried: false,
    })
}

fn parse_tags(raw: Option<&Value>) -> Vec<String> {
    raw.and_then(Value::as_str)
        .map(|s| s.split(';').map(str::trim).filter(|t| !t.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default()
}

async fn apply_tag_change(client: &AdoClient, id: i64, tags: &[String], add: bool) -> Result<ApplyResult, BulkError> {
    let current = fetch_current(client, id, &["System.Tags".to_string()]).await?;
    let existing = parse_tags(current.fields.get("System.Tags"));

    let updated: Vec<String> = if add {
        let mut merged = existing.clone();
        for tag in tags {
            if !merged.contains(tag) {
                merged.push(tag.clone());
            }
        }
        merged
    } else {
        existing.iter().filter(|t| !tags.contains(t)).cloned().collect()
    };

    let ops = vec![PatchOperation::replace_field("System.Tags", Value::String(updated.join("; ")))];
    let conflict_retried = patch_with_rev_retry(client, id, current.rev, ops).await?;

    Ok(ApplyResult {
        payload: serde_json::json!({ "tags": tags, "add": add }),
        inverse_payload: Some(serde_json::json!({ "System.Tags": existing.join("; ") })),
        irreversible: false,
        conflict_retried,
    })
}

async fn apply_assign(client: &AdoClient, id: i64, assign_to: Option<&str>) -> Result<ApplyResult, BulkError> {
    let current = fetch_current(client, id, &["System.AssignedTo".to_string()]).await?;
    let previous = current
        .fields
        .get("System.AssignedTo")
        .and_then(|v| v.get("uniqueName"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    let value = match assign_to {
        Some(name) => Value::String(name.to_string()),
        None => Value::Null,
    };
    let ops = vec![PatchOperation::replace_field("System.AssignedTo", value)];
    let conflict_retried = patch_with_rev_retry(client, id, current.rev, ops).await?;

    Ok(ApplyResult {
        payload: serde_json::json!({ "assignTo": assign_to }),
        inverse_payload: Some(serde_json::json!({ "assignTo": previous })),
        irreversible: false,
        conflict_retried,
    })
}

async fn apply_move_iteration(client: &AdoClient, id: i64, target: &str) -> Result<ApplyResult, BulkError> {
    let current = fetch_current(client, id, &["System.IterationPath".to_string()]).await?;
    let previous = current
        .fields
        .get("System.IterationPath")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();

    let ops = vec![PatchOperation::replace_field("System.IterationPath", Value::String(target.to_string()))];
    let conflict_retried = patch_with_rev_retry(client, id, current.rev, ops).await?;

    Ok(ApplyResult {
        payload: serde_json::json!({ "targetIterationPath": target }),
        inverse_payload: Some(serde_json::json!({ "targetIterationPath": previous })),
        irreversible: false,
        conflict_retried,
    })
}

async fn apply_remove(client: &AdoClient, id: i64, reason: &str, destroy: bool) -> Result<ApplyResult, BulkError> {
    let current = fetch_current(client, id, &["System.State".to_string()]).await?;
    let previous_state = current.fields.get("System.State").and_then(Value::as_str).map(str::to_owned);

    let path = if destroy {
        format!("wit/workitems/{id}?destroy=true")
    } else {
        format!("wit/workitems/{id}")
    };
    let _: Value = client.delete(&path).await?;

    if destroy {
        Ok(ApplyResult {
            payload: serde_json::json!({ "reason": reason, "destroy": true }),
            inverse_payload: None,
            irreversible: true,
            conflict_retried: false,
        })
    } else {
        Ok(ApplyResult {
            payload: serde_json::json!({ "reason": reason, "destroy": false }),
            inverse_payload: Some(serde_json::json!({ "restoreState": previous_state })),
            irreversible: false,
            conflict_retried: false,
        })
    }
}

async fn run_ai_sampling(sampling: Option<&Arc<dyn LlmSamplingChannel>>, request: SamplingRequest, min_confidence: f64) -> Result<AiDecision, BulkError> {
    let Some(channel) = sampling else {
        return Err(BulkError::AiUnavailable("no sampling channel configured".to_string()));
    };
    let reply = channel.sample(request).await.map_err(BulkError::AiUnavailable)?;
    let decision: AiDecision = serde_json::from_str(&reply).map_err(|e| BulkError::AiParse(e.to_string()))?;
    if decision.confidence < min_confidence {
        return Err(BulkError::LowConfidence {
            confidence: decision.confidence,
            minimum: min_confidence,
        });
    }
    Ok(decision)
}

async fn apply_ai_enhance_descriptions(
    client: &AdoClient,
    id: i64,
    style: Option<&str>,
    min_confidence: f64,
    sampling: Option<&Arc<dyn LlmSamplingChannel>>,
) -> Result<ApplyResult, BulkError> {
    let current = fetch_current(client, id, &["System.Title".to_string(), "System.Description".to_string()]).await?;
    let title = current.fields.get("System.Title").and_then(Value::as_str).unwrap_or_default();
    let description = current.fields.get("System.Description").and_then(Value::as_str).unwrap_or_default();

    let request = SamplingRequest {
        system_prompt: "Rewrite the work item description for clarity. Reply as JSON {\"confidence\": number, \"description\": string}.".to_string(),
        user_prompt: format!("Title: {title}\nDescription: {description}\nStyle: {}", style.unwrap_or("default")),
        max_tokens: 800,
        timeout: std::time::Duration::from_secs(60),
    };

    let decision = run_ai_sampling(sampling, request, min_confidence).await?;
    let new_description = decision.payload.get("description").and_then(Value::as_str).unwrap_or(description).to_string();
    let previous = description.to_string();
    let ops = vec![PatchOperation::replace_field("System.Description", Value::String(new_description.clone()))];
    let conflict_retried = patch_with_rev_retry(client, id, current.rev, ops).await?;
    Ok(ApplyResult {
        payload: serde_json::json!({ "description": new_description, "confidence": decision.confidence }),
        inverse_payload: Some(serde_json::json!({ "System.Description": previous })),
        irreversible: false,
        conflict_retried,
    })
}

async fn apply_ai_story_points(
    client: &AdoClient,
    id: i64,
    scale: Option<&str>,
    overwrite_existing: bool,
    min_confidence: f64,
    sampling: Option<&Arc<dyn LlmSamplingChannel>>,
) -> Result<ApplyResult, BulkError> {
    let current = fetch_current(
        client,
        id,
        &["System.Title".to_string(), "Microsoft.VSTS.Scheduling.StoryPoints".to_string()],
    )
    .await?;
    let existing_points = current.fields.get("Microsoft.VSTS.Scheduling.StoryPoints").and_then(Value::as_f64);
    if existing_points.is_some() && !overwrite_existing {
        return Ok(ApplyResult {
            payload: serde_json::json!({ "skipped": "existing estimate preserved" }),
            inverse_payload: None,
            irreversible: false,
            conflict_retried: false,
        });
    }

    let title = current.fields.get("System.Title").and_then(Value::as_str).unwrap_or_default();
    let request = SamplingRequest {
        system_prompt: format!(
            "Estimate story points on the {} scale. Reply as JSON {{\"confidence\": number, \"points\": number}}.",
            scale.unwrap_or("fibonacci")
        ),
        user_prompt: format!("Title: {title}"),
        max_tokens: 200,
        timeout: std::time::Duration::from_secs(60),
    };

    let decision = run_ai_sampling(sampling, request, min_confidence).await?;
    let points = decision.payload.get("points").and_then(Value::as_f64).unwrap_or(0.0);
    let ops = vec![PatchOperation::replace_field("Microsoft.VSTS.Scheduling.StoryPoints", serde_json::json!(points))];
    let conflict_retried = patch_with_rev_retry(client, id, current.rev, ops).await?;
    Ok(ApplyResult {
        payload: serde_json::json!({ "points": points, "confidence": decision.confidence }),
        inverse_payload: Some(serde_json::json!({ "Microsoft.VSTS.Scheduling.StoryPoints": existing_points })),
        irreversible: false,
        conflict_retried,
    })
}

async fn apply_ai_analyze(
    client: &AdoClient,
    id: i64,
    analysis_types: &[String],
    sampling: Option<&Arc<dyn LlmSamplingChannel>>,
) -> Result<ApplyResult, BulkError> {
    let current = fetch_current(client, id, &["System.Title".to_string(), "System.Description".to_string()]).await?;
    let title = current.fields.get("System.Title").and_then(Value::as_str).unwrap_or_default();

    let request = SamplingRequest {
        system_prompt: format!("Analyze this work item for: {}. Reply as JSON {{\"confidence\": number, \"analysis\": string}}.", analysis_types.join(", ")),
        user_prompt: format!("Title: {title}"),
        max_tokens: 500,
        timeout: std::time::Duration::from_secs(60),
    };

    let decision = run_ai_sampling(sampling, request, 0.0).await?;
    Ok(ApplyResult {
        payload: serde_json::json!({ "analysis": decision.payload.get("analysis"), "confidence": decision.confidence }),
        inverse_payload: None,
        irreversible: false,
        conflict_retried: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tags_splits_on_semicolon() {
        let value = Value::String("a; b ;c".to_string());
        let tags = parse_tags(Some(&value));
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_tags_handles_missing_field() {
        assert!(parse_tags(None).is_empty());
    }
}
