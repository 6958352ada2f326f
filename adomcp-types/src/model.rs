//! Core domain types: work item snapshots, query handles, selectors, and
//! the operation history recorded by the bulk engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An ADO identity value embedded in a field (e.g. `System.AssignedTo`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name shown in the ADO UI.
    pub display_name: String,
    /// Stable unique name (usually an email or SID), used for selector matching.
    pub unique_name: String,
    /// Opaque identity id as returned by ADO.
    pub id: String,
}

/// A single field value as captured in a work item snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent or explicitly cleared field.
    Null,
    /// Boolean field (e.g. some custom fields).
    Bool(bool),
    /// Numeric field (priority, story points, ids).
    Number(f64),
    /// Plain string field.
    String(String),
    /// Identity-typed field (assigned to, created by, ...).
    Identity(Identity),
}

/// A relation attached to a work item (parent/child, related, attachment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemRelation {
    /// ADO relation type string, e.g. `System.LinkTypes.Hierarchy-Forward`.
    pub rel_type: String,
    /// Absolute URL of the related resource.
    pub target_url: String,
    /// Relation-specific attributes (comment, isLocked, name).
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// Immutable snapshot of one work item's fields at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemSnapshot {
    /// Work item id.
    pub id: i64,
    /// Revision number observed when this snapshot was captured.
    pub rev_at_capture: i64,
    /// Field reference name to value, as returned by ADO.
    pub fields: HashMap<String, FieldValue>,
    /// Relations, if the caller requested `fetchFullPackages`.
    #[serde(default)]
    pub relations: Vec<WorkItemRelation>,
}

/// Result of the substantive-change analysis for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StalenessInfo {
    /// Last revision timestamp classified as a substantive (human) change.
    pub last_substantive_change: Option<DateTime<Utc>>,
    /// Display name of the author of that revision.
    pub last_substantive_change_by: Option<String>,
    /// Whole days since `last_substantive_change`, relative to analysis time.
    pub days_inactive: Option<i64>,
    /// Count of revisions classified as automated and skipped.
    pub automated_revisions_skipped: u32,
    /// True if no substantive revision was found within the inspected window.
    pub all_changes_were_automated: bool,
}

/// Cheap, display-ready per-item view retained alongside a query handle.
///
/// `index` is stable for the lifetime of the owning handle and is the
/// canonical coordinate used by index-based selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemContext {
    /// 0-based position within the handle's ordered result set.
    pub index: usize,
    /// Work item id at this position.
    pub id: i64,
    /// `System.Title`.
    pub title: String,
    /// `System.State`.
    pub state: String,
    /// `System.WorkItemType`.
    pub item_type: String,
    /// `System.AssignedTo.uniqueName`, if assigned.
    pub assigned_to: Option<String>,
    /// `System.Tags`, split on `;` and trimmed.
    pub tags: Vec<String>,
    /// `Microsoft.VSTS.Common.Priority`.
    pub priority: Option<i64>,
    /// `Microsoft.VSTS.Scheduling.StoryPoints`.
    pub story_points: Option<f64>,
    /// `System.CreatedDate`.
    pub created_date: DateTime<Utc>,
    /// `System.ChangedDate`.
    pub changed_date: DateTime<Utc>,
    /// Staleness analysis, present only if the query requested it.
    #[serde(default, flatten)]
    pub staleness: StalenessInfo,
    /// Whether `System.Description` was empty at capture time.
    pub missing_description: bool,
    /// Whether `Microsoft.VSTS.Common.AcceptanceCriteria` was empty at capture time.
    pub missing_acceptance_criteria: bool,
}

/// Aggregates over a handle's items, used to validate selectors cheaply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SelectionMetadata {
    /// All indices that may legally appear in an index-based selector.
    pub selectable_indices: Vec<usize>,
    /// Union of tags observed across every item in the handle.
    pub criteria_tags: HashSet<String>,
    /// Count of items per `System.State` value.
    pub state_histogram: HashMap<String, usize>,
    /// Count of items per `System.WorkItemType` value.
    pub type_histogram: HashMap<String, usize>,
}

/// Outcome of analyzing all items in a query: how many staleness lookups
/// succeeded versus failed, without aborting the overall query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisMetadata {
    /// Items for which staleness analysis was attempted.
    pub attempted: usize,
    /// Items for which staleness analysis failed (history fetch error).
    pub failed: usize,
}

/// Which query language produced a handle's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Work Item Query Language.
    Wiql,
    /// Analytics OData query.
    Odata,
}

/// An opaque, immutable snapshot of a query's result set plus per-item context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHandle {
    /// Opaque id, `qh_`-prefixed, returned to callers.
    pub handle_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp; reads after this instant return `NOT_FOUND`.
    pub expires_at: DateTime<Utc>,
    /// The WIQL or OData text that produced this handle, verbatim.
    pub original_query: String,
    /// Which query language was used.
    pub query_kind: QueryKind,
    /// ADO organization this handle is scoped to.
    pub organization: String,
    /// ADO project this handle is scoped to.
    pub project: String,
    /// Ordered work item ids; position is the canonical `index`.
    pub work_item_ids: Vec<i64>,
    /// `ItemContext` entries, parallel to `work_item_ids`.
    pub item_context: Vec<ItemContext>,
    /// Full snapshots, present only when `fetchFullPackages` was requested.
    #[serde(default)]
    pub snapshots: HashMap<i64, WorkItemSnapshot>,
    /// Staleness-analysis summary across the whole handle.
    pub analysis_metadata: AnalysisMetadata,
    /// Precomputed selector-validation aggregates.
    pub selection_metadata: SelectionMetadata,
    /// True if ADO reported more rows than `top`/`skip` retrieved.
    pub has_more: bool,
}

impl QueryHandle {
    /// Looks up an `ItemContext` by work item id.
    pub fn context_for(&self, id: i64) -> Option<&ItemContext> {
        self.work_item_ids
            .iter()
            .position(|candidate| *candidate == id)
            .and_then(|idx| self.item_context.get(idx))
    }

    /// True once `now` has passed `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Declarative description of which items in a handle an operation targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemSelector {
    /// Every item in the handle.
    All,
    /// An explicit, ordered list of indices (duplicates coalesced, first occurrence wins).
    Indices(Vec<usize>),
    /// A predicate evaluated against each item's `ItemContext`.
    Criteria(CriteriaFilter),
}

/// Predicate fields for [`ItemSelector::Criteria`]. Fields combine with AND;
/// multi-valued fields match with OR across their members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriteriaFilter {
    /// Match if `state` is one of these values.
    #[serde(default)]
    pub states: HashSet<String>,
    /// Match if `item_type` is one of these values.
    #[serde(default)]
    pub types: HashSet<String>,
    /// Match if the item carries any of these tags.
    #[serde(default)]
    pub tags_include_any: HashSet<String>,
    /// Match only if the item carries every one of these tags.
    #[serde(default)]
    pub tags_include_all: HashSet<String>,
    /// Match if assigned to any of these unique names; `"unassigned"` matches no assignee.
    #[serde(default)]
    pub assigned_to_any: HashSet<String>,
    /// Match only items whose `days_inactive` is known and >= this value.
    pub days_inactive_min: Option<i64>,
    /// Match only items whose `days_inactive` is known and <= this value.
    pub days_inactive_max: Option<i64>,
    /// Match if the title matches this regular expression.
    pub title_matches: Option<String>,
    /// Match only items with an empty description.
    #[serde(default)]
    pub missing_description: bool,
    /// Match only items with empty acceptance criteria.
    #[serde(default)]
    pub missing_acceptance_criteria: bool,
}

/// Whether a failed action aborts the rest of the bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOnError {
    /// A failed action aborts only the remaining actions for that one item (default).
    PerItem,
    /// A failed action aborts the entire bulk operation immediately.
    All,
    /// Failures are recorded and execution continues unconditionally.
    Never,
}

impl Default for StopOnError {
    fn default() -> Self {
        StopOnError::PerItem
    }
}

/// One typed mutation (or read) applied by the bulk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Action {
    /// Apply a set of field-level JSON-Patch operations.
    Update {
        /// Field reference name to new value.
        fields: HashMap<String, FieldValue>,
    },
    /// Post a new comment.
    Comment {
        /// Comment body (supports ADO's limited HTML).
        text: String,
    },
    /// Add tags (union with existing tags).
    AddTag {
        /// Tags to add.
        tags: Vec<String>,
    },
    /// Remove tags if present.
    RemoveTag {
        /// Tags to remove.
        tags: Vec<String>,
    },
    /// Change `System.AssignedTo`.
    Assign {
        /// Unique name to assign to; `None` unassigns.
        assign_to: Option<String>,
    },
    /// Change `System.IterationPath`.
    MoveIteration {
        /// Destination iteration path.
        target_iteration_path: String,
        /// Optional comment recorded alongside the move.
        comment: Option<String>,
    },
    /// Remove (soft-delete, or permanently destroy) a work item.
    Remove {
        /// Reason recorded for audit purposes.
        reason: String,
        /// If true, permanently destroys the item; the resulting record is irreversible.
        #[serde(default)]
        destroy: bool,
    },
    /// AI-assisted: rewrite title/description/acceptance-criteria.
    EnhanceDescriptions {
        /// Style guidance passed to the model.
        style: Option<String>,
    },
    /// AI-assisted: estimate and set story points.
    AssignStoryPoints {
        /// Point scale to use (e.g. fibonacci).
        scale: Option<String>,
        /// Whether to overwrite an existing non-empty estimate.
        #[serde(default)]
        overwrite_existing: bool,
        /// Whether to record the model's reasoning as a comment.
        #[serde(default)]
        include_reasoning: bool,
    },
    /// AI-assisted, read-only: produce an analysis without mutating the item.
    Analyze {
        /// Named analysis passes to run.
        analysis_types: Vec<String>,
    },
}

impl Action {
    /// True for actions whose effects cannot be undone (e.g. permanent destroy).
    pub fn is_irreversible(&self) -> bool {
        matches!(self, Action::Remove { destroy: true, .. })
    }

    /// True for actions that never mutate ADO state.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Action::Analyze { .. })
    }
}

/// Outcome recorded for one action applied to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The action was applied successfully.
    Applied,
    /// The action was intentionally not applied (dry-run, low confidence, cancelled).
    Skipped,
    /// The action was attempted and failed.
    Failed,
}

/// A single entry in a handle's append-only operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Owning handle.
    pub handle_id: String,
    /// Index of the affected item within the handle.
    pub index: usize,
    /// Work item id.
    pub id: i64,
    /// Monotonic sequence number, unique within the handle.
    pub sequence_no: u64,
    /// The action kind this record applies to (serialized `Action` tag).
    pub kind: String,
    /// When this record was appended.
    pub applied_at: DateTime<Utc>,
    /// The action payload as applied.
    pub payload: serde_json::Value,
    /// The payload that would undo this record, if one could be derived.
    pub inverse_payload: Option<serde_json::Value>,
    /// What happened when the action was attempted.
    pub outcome: Outcome,
    /// True if this record can never be undone, regardless of `inverse_payload`.
    pub irreversible: bool,
    /// Human-readable reason, set on `skipped`/`failed` outcomes.
    pub reason: Option<String>,
    /// Error category, set on `failed` outcomes.
    pub error_category: Option<crate::error::ErrorCategory>,
}
