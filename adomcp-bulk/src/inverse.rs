//! Replays a recorded `inverse_payload` against ADO to undo one
//! [`OperationRecord`](adomcp_types::OperationRecord).
//!
//! Each action kind in [`crate::action`] derives its own inverse shape at
//! apply time; this module is the matching decoder, one arm per kind.

use adomcp_client::wire::PatchOperation;
use adomcp_client::AdoClient;
use adomcp_types::{AdoClientError, OperationRecord};
use serde_json::Value;

use crate::action::{apply_raw_ops, delete_comment, fetch_current, patch_with_rev_retry, restore_removed};

async fn patch_single_field(client: &AdoClient, id: i64, field: &str, value: Value) -> Result<(), AdoClientError> {
    let current = fetch_current(client, id, &[]).await?;
    let ops = vec![PatchOperation::replace_field(field, value)];
    patch_with_rev_retry(client, id, current.rev, ops).await.map(|_| ())
}

/// Applies `record.inverse_payload` against ADO, returning the payload that
/// was actually applied (used as the new record's `payload`). Only called
/// for records [`OperationHistoryStore::undoable`](adomcp_handles::OperationHistoryStore::undoable)
/// already guarantees carry a non-`None` inverse.
pub(crate) async fn apply_inverse(client: &AdoClient, record: &OperationRecord) -> Result<Value, AdoClientError> {
    let inverse = record
        .inverse_payload
        .as_ref()
        .ok_or_else(|| AdoClientError::Decode(format!("record {} has no inverse payload", record.sequence_no)))?;

    // An "undo:<kind>" record's inverse is itself an undo, so it replays
    // using the same decoder as the kind it undid.
    let kind = record.kind.strip_prefix("undo:").unwrap_or(record.kind.as_str());

    match kind {
        "update" => {
            let ops_raw = inverse.get("ops").cloned().unwrap_or(Value::Array(vec![]));
            let ops: Vec<PatchOperation> = serde_json::from_value(ops_raw).map_err(|e| AdoClientError::Decode(e.to_string()))?;
            apply_raw_ops(client, record.id, ops).await?;
            Ok(serde_json::json!({ "restored": true }))
        }
        "comment" => {
            let comment_id = inverse
                .get("deleteCommentId")
                .and_then(Value::as_i64)
                .ok_or_else(|| AdoClientError::Decode("missing deleteCommentId".to_string()))?;
            delete_comment(client, record.id, comment_id).await?;
            Ok(serde_json::json!({ "deletedCommentId": comment_id }))
        }
        "add-tag" | "remove-tag" => {
            let tags = inverse.get("System.Tags").and_then(Value::as_str).unwrap_or_default().to_string();
            patch_single_field(client, record.id, "System.Tags", Value::String(tags.clone())).await?;
            Ok(serde_json::json!({ "System.Tags": tags }))
        }
        "assign" => {
            let assign_to = inverse.get("assignTo").cloned().unwrap_or(Value::Null);
            patch_single_field(client, record.id, "System.AssignedTo", assign_to.clone()).await?;
            Ok(serde_json::json!({ "assignTo": assign_to }))
        }
        "move-iteration" => {
            let target = inverse.get("targetIterationPath").and_then(Value::as_str).unwrap_or_default().to_string();
            patch_single_field(client, record.id, "System.IterationPath", Value::String(target.clone())).await?;
            Ok(serde_json::json!({ "targetIterationPath": target }))
        }
        "remove" => {
            let state = inverse.get("restoreState").and_then(Value::as_str).map(str::to_string);
            restore_removed(client, record.id, state.as_deref()).await?;
            Ok(serde_json::json!({ "restored": true, "state": state }))
        }
        "enhance-descriptions" => {
            let description = inverse.get("System.Description").and_then(Value::as_str).unwrap_or_default().to_string();
            patch_single_field(client, record.id, "System.Description", Value::String(description.clone())).await?;
            Ok(serde_json::json!({ "System.Description": description }))
        }
        "assign-story-points" => {
            let points = inverse.get("Microsoft.VSTS.Scheduling.StoryPoints").cloned().unwrap_or(Value::Null);
            patch_single_field(client, record.id, "Microsoft.VSTS.Scheduling.StoryPoints", points.clone()).await?;
            Ok(serde_json::json!({ "Microsoft.VSTS.Scheduling.StoryPoints": points }))
        }
        other => Err(AdoClientError::Decode(format!("no inverse handler for action kind {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_kind_is_a_decode_error() {
        let record = OperationRecord {
            handle_id: "qh_1".to_string(),
            index: 0,
            id: 1,
            sequence_no: 0,
            kind: "analyze".to_string(),
            applied_at: chrono::Utc::now(),
            payload: serde_json::json!({}),
            inverse_payload: Some(serde_json::json!({})),
            outcome: adomcp_types::Outcome::Applied,
            irreversible: false,
            reason: None,
            error_category: None,
        };
        let client = AdoClient::new("contoso", "widgets", std::sync::Arc::new(adomcp_client::token::StaticTokenProvider::new("pat")));
        let err = apply_inverse(&client, &record).await.unwrap_err();
        assert!(matches!(err, AdoClientError::Decode(_)));
    }

    #[tokio::test]
    async fn undo_of_an_undo_record_reuses_the_original_kinds_decoder() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contoso/widgets/_apis/wit/workitems/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "rev": 4,
                "fields": {},
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/contoso/widgets/_apis/wit/workitems/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 1, "rev": 5, "fields": {} })))
            .mount(&server)
            .await;

        let record = OperationRecord {
            handle_id: "qh_1".to_string(),
            index: 0,
            id: 1,
            sequence_no: 1,
            kind: "undo:add-tag".to_string(),
            applied_at: chrono::Utc::now(),
            payload: serde_json::json!({}),
            inverse_payload: Some(serde_json::json!({ "System.Tags": "a; b" })),
            outcome: adomcp_types::Outcome::Applied,
            irreversible: false,
            reason: None,
            error_category: None,
        };

        let client = AdoClient::new("contoso", "widgets", std::sync::Arc::new(adomcp_client::token::StaticTokenProvider::new("pat")))
            .base_url(server.uri());
        // "undo:add-tag" has no dedicated arm: it must strip the "undo:" prefix
        // and fall back to "add-tag"'s decoder rather than erroring out.
        let result = apply_inverse(&client, &record).await.unwrap();
        assert_eq!(result, serde_json::json!({ "System.Tags": "a; b" }));
    }

    #[tokio::test]
    async fn missing_inverse_payload_is_a_decode_error() {
        let record = OperationRecord {
            handle_id: "qh_1".to_string(),
            index: 0,
            id: 1,
            sequence_no: 0,
            kind: "comment".to_string(),
            applied_at: chrono::Utc::now(),
            payload: serde_json::json!({}),
            inverse_payload: None,
            outcome: adomcp_types::Outcome::Applied,
            irreversible: false,
            reason: None,
            error_category: None,
        };
        let client = AdoClient::new("contoso", "widgets", std::sync::Arc::new(adomcp_client::token::StaticTokenProvider::new("pat")));
        let err = apply_inverse(&client, &record).await.unwrap_err();
        assert!(matches!(err, AdoClientError::Decode(_)));
    }
}
