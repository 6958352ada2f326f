//! Storage, TTL eviction, and selector resolution for [`QueryHandle`]s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use adomcp_types::{CriteriaFilter, HandleError, ItemContext, ItemSelector, QueryHandle};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Default handle TTL, used when a caller does not specify one.
pub const DEFAULT_TTL: StdDuration = StdDuration::from_secs(3600);

/// How often the background sweeper scans for expired handles.
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// In-memory store for query handles, with TTL-based eviction.
///
/// Reads (`get`, `resolve`, `describe`) take a shared lock; only `store` and
/// eviction take the exclusive lock, matching a read-many/write-rare access
/// pattern. Construct via [`QueryHandleService::new`]; call
/// [`QueryHandleService::spawn_sweeper`] once to start background eviction.
pub struct QueryHandleService {
    handles: RwLock<HashMap<String, QueryHandle>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl QueryHandleService {
    /// Creates an empty handle service. Does not start the sweeper; call
    /// [`Self::spawn_sweeper`] explicitly once wrapped in an `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
        })
    }

    /// Starts the background task that evicts expired handles at most once
    /// per minute. Calling this more than once replaces the prior task.
    pub async fn spawn_sweeper(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let Some(service) = weak.upgrade() else {
                    break;
                };
                service.sweep(Utc::now()).await;
            }
        });
        *self.sweeper.lock().await = Some(handle);
    }

    /// Stops the sweeper task, if running. Test affordance.
    pub async fn stop_cleanup(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) {
        let mut handles = self.handles.write().await;
        let before = handles.len();
        handles.retain(|_, handle| !handle.is_expired(now));
        let evicted = before - handles.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = handles.len(), "swept expired query handles");
        }
    }

    /// Stores a newly materialized handle, stamping `handle_id` (if empty),
    /// `created_at`, and `expires_at` (defaulting to `created_at + ttl`).
    pub async fn store(&self, mut handle: QueryHandle, ttl: StdDuration) -> String {
        if handle.handle_id.is_empty() {
            handle.handle_id = new_handle_id();
        }
        let now = Utc::now();
        handle.created_at = now;
        handle.expires_at = now + Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(3600));
        let id = handle.handle_id.clone();
        self.handles.write().await.insert(id.clone(), handle);
        id
    }

    /// Returns a clone of the handle, or `NOT_FOUND` if absent or expired.
    pub async fn get(&self, handle_id: &str) -> Result<QueryHandle, HandleError> {
        let handles = self.handles.read().await;
        match handles.get(handle_id) {
            Some(handle) if !handle.is_expired(Utc::now()) => Ok(handle.clone()),
            Some(handle) => Err(HandleError::NotFound(format!(
                "handle {handle_id} expired at {}",
                handle.expires_at
            ))),
            None => Err(HandleError::NotFound(format!("no such handle: {handle_id}"))),
        }
    }

    /// Resolves a selector against a handle, returning `(index, id)` pairs
    /// in selection order. Pure given the handle's (immutable) contents.
    pub async fn resolve(&self, handle_id: &str, selector: &ItemSelector) -> Result<Vec<(usize, i64)>, HandleError> {
        let handle = self.get(handle_id).await?;
        resolve_against(&handle, selector)
    }

    /// Returns a bounded preview plus summary counts for a handle, optionally
    /// scoped to a selector.
    pub async fn describe(
        &self,
        handle_id: &str,
        preview_count: usize,
        selector: Option<&ItemSelector>,
    ) -> Result<HandleDescription, HandleError> {
        let handle = self.get(handle_id).await?;
        let resolved = match selector {
            Some(selector) => resolve_against(&handle, selector)?,
            None => handle
                .item_context
                .iter()
                .map(|ctx| (ctx.index, ctx.id))
                .collect(),
        };
        let preview = resolved
            .iter()
            .take(preview_count)
            .filter_map(|(idx, _)| handle.item_context.get(*idx).cloned())
            .collect();
        Ok(HandleDescription {
            handle_id: handle.handle_id.clone(),
            total_items: handle.work_item_ids.len(),
            selected_items: resolved.len(),
            expires_at: handle.expires_at,
            has_more: handle.has_more,
            selection: handle.selection_metadata.clone(),
            preview,
        })
    }

    /// Drops every stored handle. Test affordance.
    pub async fn clear_all(&self) {
        self.handles.write().await.clear();
    }

    /// Number of currently stored (not necessarily unexpired) handles. Test affordance.
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }
}

/// Summary returned by [`QueryHandleService::describe`].
#[derive(Debug, Clone)]
pub struct HandleDescription {
    /// Echoed handle id.
    pub handle_id: String,
    /// Total items in the handle, regardless of selector.
    pub total_items: usize,
    /// Items matched by the selector (or all, if none given).
    pub selected_items: usize,
    /// When the handle expires.
    pub expires_at: DateTime<Utc>,
    /// Whether the originating query had more rows than were fetched.
    pub has_more: bool,
    /// Precomputed selection aggregates for the whole handle.
    pub selection: adomcp_types::SelectionMetadata,
    /// Bounded preview of matched items.
    pub preview: Vec<ItemContext>,
}

fn new_handle_id() -> String {
    format!("qh_{}", uuid::Uuid::new_v4().simple())
}

fn resolve_against(handle: &QueryHandle, selector: &ItemSelector) -> Result<Vec<(usize, i64)>, HandleError> {
    match selector {
        ItemSelector::All => Ok(handle
            .work_item_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (idx, *id))
            .collect()),
        ItemSelector::Indices(indices) => {
            let mut seen = std::collections::HashSet::new();
            let mut out = Vec::new();
            for &idx in indices {
                if !handle.selection_metadata.selectable_indices.contains(&idx) {
                    return Err(HandleError::InvalidSelector(format!(
                        "index {idx} out of range (0..{})",
                        handle.work_item_ids.len()
                    )));
                }
                if seen.insert(idx) {
                    out.push((idx, handle.work_item_ids[idx]));
                }
            }
            Ok(out)
        }
        ItemSelector::Criteria(filter) => Ok(handle
            .item_context
            .iter()
            .filter(|ctx| matches_criteria(ctx, filter))
            .map(|ctx| (ctx.index, ctx.id))
            .collect()),
    }
}

fn matches_criteria(ctx: &ItemContext, filter: &CriteriaFilter) -> bool {
    if !filter.states.is_empty() && !filter.states.contains(&ctx.state) {
        return false;
    }
    if !filter.types.is_empty() && !filter.types.contains(&ctx.item_type) {
        return false;
    }
    if !filter.tags_include_any.is_empty() && !ctx.tags.iter().any(|t| filter.tags_include_any.contains(t)) {
        return false;
    }
    if !filter.tags_include_all.is_empty() && !filter.tags_include_all.iter().all(|t| ctx.tags.contains(t)) {
        return false;
    }
    if !filter.assigned_to_any.is_empty() {
        let assignee_matches = match &ctx.assigned_to {
            Some(assignee) => filter.assigned_to_any.contains(assignee),
            None => filter.assigned_to_any.contains("unassigned"),
        };
        if !assignee_matches {
            return false;
        }
    }
    if let Some(min) = filter.days_inactive_min {
        match ctx.staleness.days_inactive {
            Some(days) if days >= min => {}
            _ => return false,
        }
    }
    if let Some(max) = filter.days_inactive_max {
        match ctx.staleness.days_inactive {
            Some(days) if days <= max => {}
            _ => return false,
        }
    }
    if let Some(pattern) = &filter.title_matches {
        match regex::Regex::new(pattern) {
            Ok(re) if re.is_match(&ctx.title) => {}
            _ => return false,
        }
    }
    if filter.missing_description && !ctx.missing_description {
        return false;
    }
    if filter.missing_acceptance_criteria && !ctx.missing_acceptance_criteria {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use adomcp_types::{AnalysisMetadata, QueryKind, SelectionMetadata, StalenessInfo};
    use std::collections::{HashMap as StdHashMap, HashSet};

    fn sample_context(index: usize, id: i64, state: &str) -> ItemContext {
        ItemContext {
            index,
            id,
            title: format!("Item {id}"),
            state: state.to_string(),
            item_type: "Task".to_string(),
            assigned_to: None,
            tags: vec![],
            priority: None,
            story_points: None,
            created_date: Utc::now(),
            changed_date: Utc::now(),
            staleness: StalenessInfo::default(),
            missing_description: false,
            missing_acceptance_criteria: false,
        }
    }

    fn sample_handle(n: usize) -> QueryHandle {
        let item_context: Vec<ItemContext> = (0..n).map(|i| sample_context(i, (i + 1) as i64, "Active")).collect();
        let work_item_ids: Vec<i64> = item_context.iter().map(|c| c.id).collect();
        QueryHandle {
            handle_id: String::new(),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
            original_query: "SELECT [System.Id] FROM WorkItems".to_string(),
            query_kind: QueryKind::Wiql,
            organization: "contoso".to_string(),
            project: "widgets".to_string(),
            work_item_ids: work_item_ids.clone(),
            item_context,
            snapshots: StdHashMap::new(),
            analysis_metadata: AnalysisMetadata::default(),
            selection_metadata: SelectionMetadata {
                selectable_indices: (0..n).collect(),
                criteria_tags: HashSet::new(),
                state_histogram: StdHashMap::new(),
                type_histogram: StdHashMap::new(),
            },
            has_more: false,
        }
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let service = QueryHandleService::new();
        let id = service.store(sample_handle(3), DEFAULT_TTL).await;
        let handle = service.get(&id).await.unwrap();
        assert_eq!(handle.work_item_ids.len(), 3);
        assert!(id.starts_with("qh_"));
    }

    #[tokio::test]
    async fn get_missing_handle_is_not_found() {
        let service = QueryHandleService::new();
        let err = service.get("qh_does_not_exist").await.unwrap_err();
        assert!(matches!(err, HandleError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_expired_handle_is_not_found() {
        let service = QueryHandleService::new();
        let id = service.store(sample_handle(1), StdDuration::from_millis(1)).await;
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let err = service.get(&id).await.unwrap_err();
        assert!(matches!(err, HandleError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_all_returns_every_item_in_order() {
        let service = QueryHandleService::new();
        let id = service.store(sample_handle(3), DEFAULT_TTL).await;
        let resolved = service.resolve(&id, &ItemSelector::All).await.unwrap();
        assert_eq!(resolved, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn resolve_indices_preserves_first_occurrence_and_dedups() {
        let service = QueryHandleService::new();
        let id = service.store(sample_handle(3), DEFAULT_TTL).await;
        let resolved = service
            .resolve(&id, &ItemSelector::Indices(vec![2, 0, 2, 1]))
            .await
            .unwrap();
        assert_eq!(resolved, vec![(2, 3), (0, 1), (1, 2)]);
    }

    #[tokio::test]
    async fn resolve_indices_out_of_range_is_invalid_selector() {
        let service = QueryHandleService::new();
        let id = service.store(sample_handle(2), DEFAULT_TTL).await;
        let err = service.resolve(&id, &ItemSelector::Indices(vec![5])).await.unwrap_err();
        assert!(matches!(err, HandleError::InvalidSelector(_)));
    }

    #[tokio::test]
    async fn resolve_criteria_filters_by_state() {
        let service = QueryHandleService::new();
        let mut handle = sample_handle(2);
        handle.item_context[1].state = "Closed".to_string();
        let id = service.store(handle, DEFAULT_TTL).await;
        let filter = CriteriaFilter {
            states: HashSet::from(["Closed".to_string()]),
            ..Default::default()
        };
        let resolved = service.resolve(&id, &ItemSelector::Criteria(filter)).await.unwrap();
        assert_eq!(resolved, vec![(1, 2)]);
    }

    #[tokio::test]
    async fn empty_handle_only_accepts_all_or_empty_selector() {
        let service = QueryHandleService::new();
        let id = service.store(sample_handle(0), DEFAULT_TTL).await;
        assert!(service.resolve(&id, &ItemSelector::All).await.unwrap().is_empty());
        assert!(service.resolve(&id, &ItemSelector::Indices(vec![])).await.unwrap().is_empty());
        assert!(service.resolve(&id, &ItemSelector::Indices(vec![0])).await.is_err());
    }

    #[tokio::test]
    async fn clear_all_removes_every_handle() {
        let service = QueryHandleService::new();
        service.store(sample_handle(1), DEFAULT_TTL).await;
        service.store(sample_handle(1), DEFAULT_TTL).await;
        assert_eq!(service.len().await, 2);
        service.clear_all().await;
        assert_eq!(service.len().await, 0);
    }
}
