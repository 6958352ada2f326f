//! Orchestrates a typed action list over a selector-resolved subset of a
//! query handle: dry-run preview, bounded per-action concurrency, per-item
//! stop-on-error, and undo-by-replaying-recorded-inverses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use adomcp_client::AdoClient;
use adomcp_handles::{OperationHistoryStore, QueryHandleService};
use adomcp_types::{Action, BulkError, Categorized, ItemContext, ItemSelector, OperationRecord, Outcome, StopOnError};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::action::apply;
use crate::inverse::apply_inverse;
use crate::sampling::LlmSamplingChannel;

/// Default bounded concurrency for items within one action, absent an
/// explicit [`BulkOptions::per_item_concurrency`] or engine-level override.
const DEFAULT_CONCURRENCY: usize = 8;

/// Options controlling one [`BulkEngine::execute`] call.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// If true, no PATCH/POST/DELETE call is issued; every action is
    /// recorded `skipped/dry-run` and a preview is returned instead.
    pub dry_run: bool,
    /// Whether, and how broadly, a failed action aborts the remainder of
    /// the operation.
    pub stop_on_error: StopOnError,
    /// Upper bound on the number of items included in a dry-run preview.
    pub max_preview_items: usize,
    /// Overrides the engine's default per-action item concurrency.
    pub per_item_concurrency: Option<usize>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            stop_on_error: StopOnError::default(),
            max_preview_items: 10,
            per_item_concurrency: None,
        }
    }
}

/// Outcome of one action applied (or attempted) against one item.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The action kind's kebab-case tag, e.g. `"add-tag"`.
    pub kind: &'static str,
    /// What happened.
    pub outcome: Outcome,
    /// Wire-level error category, set only on `failed`.
    pub error_category: Option<adomcp_types::ErrorCategory>,
    /// Human-readable detail, set on `skipped`/`failed`.
    pub reason: Option<String>,
}

/// Every action outcome recorded for one selected item, in action order.
#[derive(Debug, Clone)]
pub struct ItemOutcomes {
    /// The item's index within the originating handle.
    pub index: usize,
    /// Work item id.
    pub id: i64,
    /// One entry per action in the request, in order.
    pub actions: Vec<ActionOutcome>,
}

/// Result of one [`BulkEngine::execute`] call.
#[derive(Debug, Clone)]
pub struct BulkResult {
    /// Number of items the selector resolved to.
    pub items_selected: usize,
    /// Number of actions in the request that were run to completion across
    /// the selected items (an action aborted by `StopOnError::All` before
    /// it starts is not counted).
    pub actions_completed: usize,
    /// See §4.6: no `failed` outcome unless `stop_on_error` is `Never`, in
    /// which case at least one action must have applied.
    pub success: bool,
    /// Per-item, per-action outcomes, in selection order.
    pub item_outcomes: Vec<ItemOutcomes>,
    /// Bounded item preview; populated only for `dry_run` requests.
    pub preview: Vec<ItemContext>,
    /// Human-readable failure messages, one per failed action application.
    pub errors: Vec<String>,
    /// Non-fatal notices (e.g. a conflict retry succeeded).
    pub warnings: Vec<String>,
}

/// Outcome of undoing one previously-applied [`OperationRecord`].
#[derive(Debug, Clone)]
pub struct UndoItemResult {
    /// Work item id.
    pub id: i64,
    /// The original record's sequence number, for correlation.
    pub sequence_no: u64,
    /// The original record's action kind.
    pub kind: String,
    /// Whether the inverse applied successfully.
    pub outcome: Outcome,
    /// Error detail, if the inverse failed.
    pub error: Option<String>,
}

/// Result of one [`BulkEngine::undo`] call.
#[derive(Debug, Clone)]
pub struct UndoResult {
    /// The handle whose history was replayed.
    pub handle_id: String,
    /// Number of eligible records considered.
    pub attempted: usize,
    /// Number of inverses applied successfully.
    pub undone: usize,
    /// Number of inverses that failed.
    pub failed: usize,
    /// Per-record results, newest-first (matching application order).
    pub item_results: Vec<UndoItemResult>,
    /// Human-readable failure messages.
    pub errors: Vec<String>,
}

fn action_kind(action: &Action) -> &'static str {
    match action {
        Action::Update { .. } => "update",
        Action::Comment { .. } => "comment",
        Action::AddTag { .. } => "add-tag",
        Action::RemoveTag { .. } => "remove-tag",
        Action::Assign { .. } => "assign",
        Action::MoveIteration { .. } => "move-iteration",
        Action::Remove { .. } => "remove",
        Action::EnhanceDescriptions { .. } => "enhance-descriptions",
        Action::AssignStoryPoints { .. } => "assign-story-points",
        Action::Analyze { .. } => "analyze",
    }
}

/// Orchestrates typed action lists over selector-resolved items, backed by
/// [`QueryHandleService`] for selection and [`OperationHistoryStore`] for
/// the append-only audit log that undo replays.
pub struct BulkEngine {
    client: Arc<AdoClient>,
    handles: Arc<QueryHandleService>,
    history: Arc<OperationHistoryStore>,
    sampling: Option<Arc<dyn LlmSamplingChannel>>,
    min_confidence_score: f64,
    default_concurrency: usize,
}

impl BulkEngine {
    /// Builds an engine with no AI sampling channel, a `0.0` minimum
    /// confidence, and the default per-action concurrency of 8.
    pub fn new(client: Arc<AdoClient>, handles: Arc<QueryHandleService>, history: Arc<OperationHistoryStore>) -> Self {
        Self {
            client,
            handles,
            history,
            sampling: None,
            min_confidence_score: 0.0,
            default_concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Attaches an LLM sampling channel, required for AI-assisted actions.
    #[must_use]
    pub fn with_sampling(mut self, sampling: Arc<dyn LlmSamplingChannel>) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Overrides the minimum confidence AI-assisted actions must report.
    #[must_use]
    pub fn with_min_confidence_score(mut self, score: f64) -> Self {
        self.min_confidence_score = score;
        self
    }

    /// Overrides the default per-action item concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency.max(1);
        self
    }

    /// Resolves `selector` against `handle_id` and applies `actions` to the
    /// result, in order, honoring `options`.
    pub async fn execute(
        &self,
        handle_id: &str,
        selector: ItemSelector,
        actions: Vec<Action>,
        options: BulkOptions,
    ) -> Result<BulkResult, BulkError> {
        if actions.is_empty() {
            return Err(BulkError::Validation("actions must not be empty".to_string()));
        }

        let resolved = self.handles.resolve(handle_id, &selector).await?;
        let items_selected = resolved.len();

        if options.dry_run {
            return self.execute_dry_run(handle_id, &resolved, &actions, &options).await;
        }

        let concurrency = options.per_item_concurrency.unwrap_or(self.default_concurrency).max(1);

        let mut position: HashMap<i64, usize> = HashMap::with_capacity(resolved.len());
        let mut item_outcomes: Vec<ItemOutcomes> = Vec::with_capacity(resolved.len());
        for &(index, id) in &resolved {
            position.insert(id, item_outcomes.len());
            item_outcomes.push(ItemOutcomes { index, id, actions: Vec::new() });
        }

        let mut aborted_items: HashSet<i64> = HashSet::new();
        let mut global_abort = false;
        let mut actions_completed = 0usize;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for action in &actions {
            if global_abort {
                break;
            }
            actions_completed += 1;
            let kind = action_kind(action);

            let results = self.run_action_over_items(&resolved, action, &aborted_items, concurrency).await;

            for (id, outcome) in results {
                let idx = position[&id];
                let index = item_outcomes[idx].index;
                match outcome {
                    None => {
                        item_outcomes[idx].actions.push(ActionOutcome {
                            kind,
                            outcome: Outcome::Skipped,
                            error_category: None,
                            reason: Some("earlier action failed for this item".to_string()),
                        });
                    }
                    Some(Ok(applied)) => {
                        if applied.conflict_retried {
                            warnings.push(format!("item {id}: {kind} applied after one conflict retry"));
                        }
                        self.history
                            .append(OperationRecord {
                                handle_id: handle_id.to_string(),
                                index,
                                id,
                                sequence_no: 0,
                                kind: kind.to_string(),
                                applied_at: Utc::now(),
                                payload: applied.payload,
                                inverse_payload: applied.inverse_payload,
                                outcome: Outcome::Applied,
                                irreversible: applied.irreversible,
                                reason: None,
                                error_category: None,
                            })
                            .await;
                        item_outcomes[idx].actions.push(ActionOutcome {
                            kind,
                            outcome: Outcome::Applied,
                            error_category: None,
                            reason: None,
                        });
                    }
                    Some(Err(BulkError::LowConfidence { confidence, minimum })) => {
                        let reason = format!("confidence {confidence} below minimum {minimum}");
                        self.history
                            .append(skipped_record(handle_id, index, id, kind, reason.clone()))
                            .await;
                        item_outcomes[idx].actions.push(ActionOutcome {
                            kind,
                            outcome: Outcome::Skipped,
                            error_category: None,
                            reason: Some(reason),
                        });
                    }
                    Some(Err(err)) => {
                        let category = err.category();
                        let reason = err.to_string();
                        errors.push(format!("item {id}: {reason}"));
                        self.history
                            .append(OperationRecord {
                                handle_id: handle_id.to_string(),
                                index,
                                id,
                                sequence_no: 0,
                                kind: kind.to_string(),
                                applied_at: Utc::now(),
                                payload: Value::Null,
                                inverse_payload: None,
                                outcome: Outcome::Failed,
                                irreversible: false,
                                reason: Some(reason.clone()),
                                error_category: Some(category),
                            })
                            .await;
                        item_outcomes[idx].actions.push(ActionOutcome {
                            kind,
                            outcome: Outcome::Failed,
                            error_category: Some(category),
                            reason: Some(reason),
                        });
                        match options.stop_on_error {
                            StopOnError::PerItem => {
                                aborted_items.insert(id);
                            }
                            StopOnError::All => {
                                aborted_items.insert(id);
                                global_abort = true;
                            }
                            StopOnError::Never => {}
                        }
                    }
                }
            }
        }

        let success = match options.stop_on_error {
            StopOnError::Never => item_outcomes
                .iter()
                .any(|io| io.actions.iter().any(|a| a.outcome == Outcome::Applied)),
            _ => !item_outcomes.iter().any(|io| io.actions.iter().any(|a| a.outcome == Outcome::Failed)),
        };

        Ok(BulkResult {
            items_selected,
            actions_completed,
            success,
            item_outcomes,
            preview: Vec::new(),
            errors,
            warnings,
        })
    }

    async fn execute_dry_run(
        &self,
        handle_id: &str,
        resolved: &[(usize, i64)],
        actions: &[Action],
        options: &BulkOptions,
    ) -> Result<BulkResult, BulkError> {
        let handle = self.handles.get(handle_id).await?;
        let preview: Vec<ItemContext> = resolved
            .iter()
            .take(options.max_preview_items)
            .filter_map(|(idx, _)| handle.item_context.get(*idx).cloned())
            .collect();

        let mut item_outcomes = Vec::with_capacity(resolved.len());
        for &(index, id) in resolved {
            let mut action_outcomes = Vec::with_capacity(actions.len());
            for action in actions {
                let kind = action_kind(action);
                self.history
                    .append(skipped_record(handle_id, index, id, kind, "dry-run".to_string()))
                    .await;
                action_outcomes.push(ActionOutcome {
                    kind,
                    outcome: Outcome::Skipped,
                    error_category: None,
                    reason: Some("dry-run".to_string()),
                });
            }
            item_outcomes.push(ItemOutcomes { index, id, actions: action_outcomes });
        }

        Ok(BulkResult {
            items_selected: resolved.len(),
            actions_completed: actions.len(),
            success: true,
            item_outcomes,
            preview,
            errors: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Applies `action` to every item in `resolved` with bounded
    /// concurrency, skipping (without an HTTP call) any item already in
    /// `aborted_items` from a previous action's `stop_on_error` failure.
    async fn run_action_over_items(
        &self,
        resolved: &[(usize, i64)],
        action: &Action,
        aborted_items: &HashSet<i64>,
        concurrency: usize,
    ) -> Vec<(i64, Option<Result<crate::action::ApplyResult, BulkError>>)> {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = Vec::with_capacity(resolved.len());

        for &(_, id) in resolved {
            if aborted_items.contains(&id) {
                tasks.push((id, None));
                continue;
            }
            let client = Arc::clone(&self.client);
            let sampling = self.sampling.clone();
            let min_confidence = self.min_confidence_score;
            let action = action.clone();
            let semaphore = Arc::clone(&semaphore);
            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                apply(&client, id, &action, min_confidence, sampling.as_ref()).await
            });
            tasks.push((id, Some(task)));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (id, task) in tasks {
            match task {
                None => results.push((id, None)),
                Some(task) => {
                    let outcome = match task.await {
                        Ok(result) => result,
                        Err(join_err) => Err(BulkError::Client(adomcp_types::AdoClientError::Other(Box::new(join_err)))),
                    };
                    results.push((id, Some(outcome)));
                }
            }
        }
        results
    }

    /// Replays the eligible records for `handle_id` (optionally narrowed by
    /// `selector`) in reverse `sequence_no` order, recording each inverse
    /// application as a new `OperationRecord`. Continues past individual
    /// failures and reports per-record results.
    pub async fn undo(&self, handle_id: &str, selector: Option<ItemSelector>) -> Result<UndoResult, BulkError> {
        self.history.has_history(handle_id).await?;

        let mut records = self.history.undoable(handle_id).await;
        if let Some(selector) = &selector {
            let resolved = self.handles.resolve(handle_id, selector).await?;
            let allowed: HashSet<i64> = resolved.into_iter().map(|(_, id)| id).collect();
            records.retain(|record| allowed.contains(&record.id));
        }

        let mut item_results = Vec::with_capacity(records.len());
        let mut errors = Vec::new();
        let mut undone = 0;
        let mut failed = 0;

        for record in &records {
            match apply_inverse(&self.client, record).await {
                Ok(payload) => {
                    undone += 1;
                    self.history
                        .append(OperationRecord {
                            handle_id: handle_id.to_string(),
                            index: record.index,
                            id: record.id,
                            sequence_no: 0,
                            kind: format!("undo:{}", record.kind),
                            applied_at: Utc::now(),
                            payload,
                            inverse_payload: Some(record.payload.clone()),
                            outcome: Outcome::Applied,
                            irreversible: false,
                            reason: None,
                            error_category: None,
                        })
                        .await;
                    item_results.push(UndoItemResult {
                        id: record.id,
                        sequence_no: record.sequence_no,
                        kind: record.kind.clone(),
                        outcome: Outcome::Applied,
                        error: None,
                    });
                }
                Err(err) => {
                    failed += 1;
                    let message = format!("item {}: failed to undo {}: {err}", record.id, record.kind);
                    errors.push(message.clone());
                    self.history
                        .append(OperationRecord {
                            handle_id: handle_id.to_string(),
                            index: record.index,
                            id: record.id,
                            sequence_no: 0,
                            kind: format!("undo:{}", record.kind),
                            applied_at: Utc::now(),
                            payload: Value::Null,
                            inverse_payload: None,
                            outcome: Outcome::Failed,
                            irreversible: false,
                            reason: Some(err.to_string()),
                            error_category: Some(err.category()),
                        })
                        .await;
                    item_results.push(UndoItemResult {
                        id: record.id,
                        sequence_no: record.sequence_no,
                        kind: record.kind.clone(),
                        outcome: Outcome::Failed,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        Ok(UndoResult {
            handle_id: handle_id.to_string(),
            attempted: records.len(),
            undone,
            failed,
            item_results,
            errors,
        })
    }
}

fn skipped_record(handle_id: &str, index: usize, id: i64, kind: &str, reason: String) -> OperationRecord {
    OperationRecord {
        handle_id: handle_id.to_string(),
        index,
        id,
        sequence_no: 0,
        kind: kind.to_string(),
        applied_at: Utc::now(),
        payload: Value::Null,
        inverse_payload: None,
        outcome: Outcome::Skipped,
        irreversible: false,
        reason: Some(reason),
        error_category: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_matches_spec_tags() {
        assert_eq!(action_kind(&Action::Comment { text: String::new() }), "comment");
        assert_eq!(action_kind(&Action::AddTag { tags: vec![] }), "add-tag");
        assert_eq!(action_kind(&Action::RemoveTag { tags: vec![] }), "remove-tag");
        assert_eq!(action_kind(&Action::Assign { assign_to: None }), "assign");
        assert_eq!(
            action_kind(&Action::MoveIteration { target_iteration_path: String::new(), comment: None }),
            "move-iteration"
        );
        assert_eq!(action_kind(&Action::Remove { reason: String::new(), destroy: false }), "remove");
        assert_eq!(action_kind(&Action::Analyze { analysis_types: vec![] }), "analyze");
    }

    #[tokio::test]
    async fn execute_rejects_empty_action_list() {
        let client = Arc::new(AdoClient::new("contoso", "widgets", Arc::new(adomcp_client::token::StaticTokenProvider::new("pat"))));
        let handles = QueryHandleService::new();
        let history = Arc::new(OperationHistoryStore::new());
        let engine = BulkEngine::new(client, handles, history);
        let err = engine
            .execute("qh_missing", ItemSelector::All, vec![], BulkOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::Validation(_)));
    }

    #[tokio::test]
    async fn execute_against_unknown_handle_is_not_found() {
        let client = Arc::new(AdoClient::new("contoso", "widgets", Arc::new(adomcp_client::token::StaticTokenProvider::new("pat"))));
        let handles = QueryHandleService::new();
        let history = Arc::new(OperationHistoryStore::new());
        let engine = BulkEngine::new(client, handles, history);
        let actions = vec![Action::Comment { text: "hi".to_string() }];
        let err = engine
            .execute("qh_missing", ItemSelector::All, actions, BulkOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::Handle(_)));
    }

    #[tokio::test]
    async fn undo_against_handle_with_no_history_is_not_found() {
        let client = Arc::new(AdoClient::new("contoso", "widgets", Arc::new(adomcp_client::token::StaticTokenProvider::new("pat"))));
        let handles = QueryHandleService::new();
        let history = Arc::new(OperationHistoryStore::new());
        let engine = BulkEngine::new(client, handles, history);
        let err = engine.undo("qh_missing", None).await.unwrap_err();
        assert!(matches!(err, BulkError::Handle(_)));
    }
}
