//! Executes a WIQL/OData query end to end: run query, batch-fetch fields,
//! enrich with staleness, filter, and materialize a query handle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use adomcp_client::wire::{RevisionsResponse, WiqlRequest, WiqlResponse, WorkItemBatchResponse};
use adomcp_client::AdoClient;
use adomcp_handles::QueryHandleService;
use adomcp_types::{AnalysisMetadata, ItemContext, QueryError, QueryHandle, QueryKind, SelectionMetadata};
use chrono::Utc;
use tokio::sync::Semaphore;

use crate::convert::{to_item_context, to_snapshot, ALWAYS_ON_FIELDS};

const MAX_BATCH: usize = 200;

/// Options controlling one query execution.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Additional field reference names to fetch beyond the always-on set.
    pub include_fields: Vec<String>,
    /// Max items to return after pagination.
    pub top: Option<usize>,
    /// Items to skip before `top` is applied.
    pub skip: Option<usize>,
    /// Whether to run the substantive-change analyzer over returned items.
    pub include_substantive_change: bool,
    /// Revisions to inspect per item when analyzing staleness (default 50).
    pub substantive_change_history_count: Option<usize>,
    /// Named client-side filters: `duplicates`, `missing_description`, `missing_acceptance_criteria`, `stale`.
    pub filter_by_patterns: Vec<String>,
    /// Only keep items whose `daysInactive` is known and >= this value.
    pub filter_by_days_inactive_min: Option<i64>,
    /// Only keep items whose `daysInactive` is known and <= this value.
    pub filter_by_days_inactive_max: Option<i64>,
    /// Only keep items with an empty description.
    pub filter_by_missing_description: bool,
    /// Only keep items with empty acceptance criteria.
    pub filter_by_missing_acceptance_criteria: bool,
    /// Fetch comments/revisions/relations per item (2-3x the ADO call cost).
    pub fetch_full_packages: bool,
    /// TTL for the resulting handle; defaults to the service's configured TTL.
    pub handle_ttl: Option<std::time::Duration>,
    /// Bounded fan-out for concurrent staleness analysis (default 16).
    pub fan_out: usize,
    /// Number of items to include in the returned preview.
    pub preview_count: usize,
}

/// Result of executing a query: the minted handle plus a cheap preview.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Opaque handle id, `qh_`-prefixed.
    pub handle_id: String,
    /// Total items stored in the handle (after filtering).
    pub total_items: usize,
    /// Bounded preview of item contexts.
    pub preview: Vec<ItemContext>,
    /// True if ADO reported more rows than were fetched.
    pub has_more: bool,
    /// Non-fatal warnings (e.g. full-package cost warning, analysis failures).
    pub warnings: Vec<String>,
}

/// Executes WIQL/OData queries against ADO and materializes query handles.
pub struct QueryExecutor {
    client: Arc<AdoClient>,
    handles: Arc<QueryHandleService>,
    organization: String,
    project: String,
    automation_patterns: Vec<String>,
    substantive_fields: Vec<String>,
}

impl QueryExecutor {
    /// Builds an executor scoped to one client/handle-service pair.
    pub fn new(client: Arc<AdoClient>, handles: Arc<QueryHandleService>, organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            client,
            handles,
            organization: organization.into(),
            project: project.into(),
            automation_patterns: Vec::new(),
            substantive_fields: Vec::new(),
        }
    }

    /// Sets the author-name patterns the staleness analyzer treats as automation.
    pub fn with_automation_patterns(mut self, patterns: Vec<String>) -> Self {
        self.automation_patterns = patterns;
        self
    }

    /// Sets extra fields the staleness analyzer treats as substantive.
    pub fn with_substantive_fields(mut self, fields: Vec<String>) -> Self {
        self.substantive_fields = fields;
        self
    }

    /// Runs `query` (WIQL) and stores the result under a new handle.
    pub async fn execute_wiql(&self, query: &str, options: QueryOptions) -> Result<QueryResult, QueryError> {
        check_supported(query)?;

        let response: WiqlResponse = self
            .client
            .post("wit/wiql", &WiqlRequest { query: query.to_string() })
            .await?;

        let mut ordered_ids: Vec<i64> = if !response.work_item_relations.is_empty() {
            let mut seen = HashSet::new();
            response
                .work_item_relations
                .iter()
                .filter(|row| row.source.is_some())
                .map(|row| row.target.id)
                .filter(|id| seen.insert(*id))
                .collect()
        } else {
            response.work_items.iter().map(|w| w.id).collect()
        };

        let total_before_paging = ordered_ids.len();
        let skip = options.skip.unwrap_or(0);
        let top = options.top.unwrap_or(total_before_paging.saturating_sub(skip).max(1));
        if skip > 0 {
            ordered_ids = ordered_ids.split_off(skip.min(ordered_ids.len()));
        }
        let has_more_from_paging = ordered_ids.len() > top;
        ordered_ids.truncate(top);

        let mut warnings = Vec::new();
        if options.fetch_full_packages && ordered_ids.len() > 50 {
            warnings.push(format!(
                "fetchFullPackages requested for {} items; this multiplies ADO call cost 2-3x per item",
                ordered_ids.len()
            ));
        }

        let mut fields_wanted: Vec<String> = ALWAYS_ON_FIELDS.iter().map(|s| s.to_string()).collect();
        for extra in &options.include_fields {
            if !fields_wanted.contains(extra) {
                fields_wanted.push(extra.clone());
            }
        }

        let dtos = self.fetch_batches(&ordered_ids, &fields_wanted).await?;
        let by_id: HashMap<i64, _> = dtos.into_iter().map(|dto| (dto.id, dto)).collect();

        let mut item_context: Vec<ItemContext> = Vec::with_capacity(ordered_ids.len());
        let mut snapshots = HashMap::new();
        for (idx, id) in ordered_ids.iter().enumerate() {
            let Some(dto) = by_id.get(id) else { continue };
            item_context.push(to_item_context(idx, dto));
            if options.fetch_full_packages {
                snapshots.insert(*id, to_snapshot(dto));
            }
        }

        let mut analysis_metadata = AnalysisMetadata::default();
        if options.include_substantive_change {
            let history_count = options.substantive_change_history_count.unwrap_or(50);
            let fan_out = options.fan_out.max(1);
            self.enrich_staleness(&mut item_context, history_count, fan_out, &mut analysis_metadata).await;
        }

        let (item_context, warnings) = apply_filters(item_context, &options, warnings);

        let work_item_ids: Vec<i64> = item_context.iter().map(|ctx| ctx.id).collect();
        let item_context = reindex(item_context);
        let selection_metadata = build_selection_metadata(&item_context);

        let handle = QueryHandle {
            handle_id: String::new(),
            created_at: Utc::now(),
            expires_at: Utc::now(),
            original_query: query.to_string(),
            query_kind: QueryKind::Wiql,
            organization: self.organization.clone(),
            project: self.project.clone(),
            work_item_ids,
            item_context: item_context.clone(),
            snapshots,
            analysis_metadata,
            selection_metadata,
            has_more: has_more_from_paging,
        };

        let ttl = options.handle_ttl.unwrap_or(adomcp_handles::DEFAULT_TTL);
        let handle_id = self.handles.store(handle, ttl).await;

        let preview_count = if options.preview_count == 0 { 10 } else { options.preview_count };
        Ok(QueryResult {
            handle_id,
            total_items: item_context.len(),
            preview: item_context.into_iter().take(preview_count).collect(),
            has_more: has_more_from_paging,
            warnings,
        })
    }

    async fn fetch_batches(&self, ids: &[i64], fields: &[String]) -> Result<Vec<adomcp_client::wire::WorkItemDto>, QueryError> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH) {
            if chunk.is_empty() {
                continue;
            }
            let ids_param = chunk.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
            let fields_param = fields.join(",");
            let path = format!("wit/workitems?ids={ids_param}&fields={fields_param}");
            let response: WorkItemBatchResponse = self.client.get(&path).await?;
            out.extend(response.value);
        }
        Ok(out)
    }

    async fn enrich_staleness(
        &self,
        item_context: &mut [ItemContext],
        history_count: usize,
        fan_out: usize,
        analysis_metadata: &mut AnalysisMetadata,
    ) {
        let semaphore = Arc::new(Semaphore::new(fan_out));
        let mut handles = Vec::with_capacity(item_context.len());
        for ctx in item_context.iter() {
            let id = ctx.id;
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let path = format!("wit/workitems/{id}/revisions?$top={history_count}");
                let result: Result<RevisionsResponse, _> = client.get(&path).await;
                (id, result)
            }));
        }

        let mut by_id = HashMap::new();
        for handle in handles {
            analysis_metadata.attempted += 1;
            match handle.await {
                Ok((id, Ok(response))) => {
                    by_id.insert(id, response.value);
                }
                Ok((id, Err(err))) => {
                    analysis_metadata.failed += 1;
                    tracing::warn!(id, error = %err, "staleness analysis failed for item");
                }
                Err(join_err) => {
                    analysis_metadata.failed += 1;
                    tracing::warn!(error = %join_err, "staleness analysis task panicked");
                }
            }
        }

        for ctx in item_context.iter_mut() {
            if let Some(revisions) = by_id.get(&ctx.id) {
                ctx.staleness = adomcp_analyzer::classify(revisions, &self.automation_patterns, &self.substantive_fields, Utc::now());
            }
        }
    }
}

fn check_supported(query: &str) -> Result<(), QueryError> {
    let upper = query.to_uppercase();
    if upper.contains("FROM WORKITEMLINKS") && upper.contains("ORDER BY") {
        return Err(QueryError::Unsupported(
            "ORDER BY is not supported on WorkItemLinks hierarchy queries".to_string(),
        ));
    }
    Ok(())
}

fn apply_filters(items: Vec<ItemContext>, options: &QueryOptions, mut warnings: Vec<String>) -> (Vec<ItemContext>, Vec<String>) {
    let patterns: HashSet<&str> = options.filter_by_patterns.iter().map(String::as_str).collect();
    let filtered: Vec<ItemContext> = items
        .into_iter()
        .filter(|ctx| {
            if options.filter_by_missing_description && !ctx.missing_description {
                return false;
            }
            if options.filter_by_missing_acceptance_criteria && !ctx.missing_acceptance_criteria {
                return false;
            }
            if let Some(min) = options.filter_by_days_inactive_min {
                if !matches!(ctx.staleness.days_inactive, Some(d) if d >= min) {
                    return false;
                }
            }
            if let Some(max) = options.filter_by_days_inactive_max {
                if !matches!(ctx.staleness.days_inactive, Some(d) if d <= max) {
                    return false;
                }
            }
            if patterns.contains("missing_description") && !ctx.missing_description {
                return false;
            }
            if patterns.contains("missing_acceptance_criteria") && !ctx.missing_acceptance_criteria {
                return false;
            }
            if patterns.contains("stale") && ctx.staleness.days_inactive.is_none() {
                return false;
            }
            true
        })
        .collect();
    if filtered.is_empty() && !options.filter_by_patterns.is_empty() {
        warnings.push("no items matched the requested filters".to_string());
    }
    (filtered, warnings)
}

fn reindex(items: Vec<ItemContext>) -> Vec<ItemContext> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, mut ctx)| {
            ctx.index = idx;
            ctx
        })
        .collect()
}

fn build_selection_metadata(items: &[ItemContext]) -> SelectionMetadata {
    let mut metadata = SelectionMetadata {
        selectable_indices: (0..items.len()).collect(),
        ..Default::default()
    };
    for ctx in items {
        *metadata.state_histogram.entry(ctx.state.clone()).or_insert(0) += 1;
        *metadata.type_histogram.entry(ctx.item_type.clone()).or_insert(0) += 1;
        metadata.criteria_tags.extend(ctx.tags.iter().cloned());
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_by_on_work_item_links_is_unsupported() {
        let query = "SELECT [System.Id] FROM WorkItemLinks ORDER BY [System.Id]";
        assert!(check_supported(query).is_err());
    }

    #[test]
    fn order_by_on_flat_query_is_supported() {
        let query = "SELECT [System.Id] FROM WorkItems ORDER BY [System.Id]";
        assert!(check_supported(query).is_ok());
    }

    #[test]
    fn reindex_produces_contiguous_indices() {
        let items = vec![
            ItemContext {
                index: 5,
                id: 1,
                title: String::new(),
                state: String::new(),
                item_type: String::new(),
                assigned_to: None,
                tags: vec![],
                priority: None,
                story_points: None,
                created_date: Utc::now(),
                changed_date: Utc::now(),
                staleness: Default::default(),
                missing_description: false,
                missing_acceptance_criteria: false,
            },
            ItemContext {
                index: 9,
                id: 2,
                title: String::new(),
                state: String::new(),
                item_type: String::new(),
                assigned_to: None,
                tags: vec![],
                priority: None,
                story_points: None,
                created_date: Utc::now(),
                changed_date: Utc::now(),
                staleness: Default::default(),
                missing_description: false,
                missing_acceptance_criteria: false,
            },
        ];
        let reindexed = reindex(items);
        assert_eq!(reindexed[0].index, 0);
        assert_eq!(reindexed[1].index, 1);
    }
}
