//! Append-only per-handle operation log, with undo-by-replaying-inverses.

use std::collections::HashMap;

use adomcp_types::{HandleError, OperationRecord, Outcome};
use tokio::sync::Mutex;

/// Per-handle, append-only log of applied (or attempted) mutations.
///
/// Each handle gets its own mutex so that unrelated handles never contend;
/// `sequence_no` is allocated monotonically while holding that handle's lock.
pub struct OperationHistoryStore {
    per_handle: Mutex<HashMap<String, Vec<OperationRecord>>>,
}

impl OperationHistoryStore {
    /// Creates an empty history store.
    pub fn new() -> Self {
        Self {
            per_handle: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a record, allocating the next `sequence_no` for its handle.
    /// The `sequence_no` on the passed-in record is overwritten.
    pub async fn append(&self, mut record: OperationRecord) -> OperationRecord {
        let mut guard = self.per_handle.lock().await;
        let log = guard.entry(record.handle_id.clone()).or_default();
        let next_seq = log.last().map(|r| r.sequence_no + 1).unwrap_or(0);
        record.sequence_no = next_seq;
        log.push(record.clone());
        record
    }

    /// Returns every record for `handle_id`, oldest first.
    pub async fn history(&self, handle_id: &str) -> Vec<OperationRecord> {
        self.per_handle
            .lock()
            .await
            .get(handle_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the records eligible for undo: `applied`, not `irreversible`,
    /// and carrying an `inverse_payload`, newest first.
    pub async fn undoable(&self, handle_id: &str) -> Vec<OperationRecord> {
        let mut records: Vec<OperationRecord> = self
            .history(handle_id)
            .await
            .into_iter()
            .filter(|r| r.outcome == Outcome::Applied && !r.irreversible && r.inverse_payload.is_some())
            .collect();
        records.sort_by(|a, b| b.sequence_no.cmp(&a.sequence_no));
        records
    }

    /// Validates that `handle_id` has at least one entry (used before undo
    /// to surface a clean `NOT_FOUND` rather than an empty no-op).
    pub async fn has_history(&self, handle_id: &str) -> Result<(), HandleError> {
        if self.per_handle.lock().await.contains_key(handle_id) {
            Ok(())
        } else {
            Err(HandleError::NotFound(format!("no operation history for handle {handle_id}")))
        }
    }
}

impl Default for OperationHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(handle_id: &str, outcome: Outcome, inverse: Option<serde_json::Value>, irreversible: bool) -> OperationRecord {
        OperationRecord {
            handle_id: handle_id.to_string(),
            index: 0,
            id: 1,
            sequence_no: 0,
            kind: "update".to_string(),
            applied_at: Utc::now(),
            payload: serde_json::json!({}),
            inverse_payload: inverse,
            outcome,
            irreversible,
            reason: None,
            error_category: None,
        }
    }

    #[tokio::test]
    async fn append_allocates_monotonic_sequence_numbers() {
        let store = OperationHistoryStore::new();
        let r0 = store.append(record("qh_1", Outcome::Applied, Some(serde_json::json!({})), false)).await;
        let r1 = store.append(record("qh_1", Outcome::Applied, Some(serde_json::json!({})), false)).await;
        assert_eq!(r0.sequence_no, 0);
        assert_eq!(r1.sequence_no, 1);
    }

    #[tokio::test]
    async fn separate_handles_have_independent_sequences() {
        let store = OperationHistoryStore::new();
        let a = store.append(record("qh_a", Outcome::Applied, Some(serde_json::json!({})), false)).await;
        let b = store.append(record("qh_b", Outcome::Applied, Some(serde_json::json!({})), false)).await;
        assert_eq!(a.sequence_no, 0);
        assert_eq!(b.sequence_no, 0);
    }

    #[tokio::test]
    async fn undoable_excludes_irreversible_and_missing_inverse() {
        let store = OperationHistoryStore::new();
        store.append(record("qh_1", Outcome::Applied, Some(serde_json::json!({})), false)).await;
        store.append(record("qh_1", Outcome::Applied, None, false)).await;
        store.append(record("qh_1", Outcome::Applied, Some(serde_json::json!({})), true)).await;
        store.append(record("qh_1", Outcome::Failed, Some(serde_json::json!({})), false)).await;

        let undoable = store.undoable("qh_1").await;
        assert_eq!(undoable.len(), 1);
        assert_eq!(undoable[0].sequence_no, 0);
    }

    #[tokio::test]
    async fn undoable_orders_newest_first() {
        let store = OperationHistoryStore::new();
        store.append(record("qh_1", Outcome::Applied, Some(serde_json::json!({})), false)).await;
        store.append(record("qh_1", Outcome::Applied, Some(serde_json::json!({})), false)).await;
        let undoable = store.undoable("qh_1").await;
        assert_eq!(undoable[0].sequence_no, 1);
        assert_eq!(undoable[1].sequence_no, 0);
    }

    #[tokio::test]
    async fn has_history_reports_not_found_for_unknown_handle() {
        let store = OperationHistoryStore::new();
        assert!(store.has_history("qh_missing").await.is_err());
    }
}
