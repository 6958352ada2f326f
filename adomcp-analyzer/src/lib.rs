#![deny(missing_docs)]
//! Replays Azure DevOps work item revision history and classifies each
//! revision as substantive (human-meaningful) or automated.
//!
//! The classifier itself, [`classify`], is a pure function of its inputs —
//! no network access, no clock reads beyond the `now` parameter — so it is
//! fully unit- and property-testable without a mock ADO server.

use adomcp_client::wire::WorkItemRevisionDto;
use adomcp_types::StalenessInfo;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Fields that always count as substantive when changed, beyond any
/// caller-supplied extras from configuration.
const BUILTIN_SUBSTANTIVE_FIELDS: &[&str] = &[
    "System.Title",
    "System.Description",
    "Microsoft.VSTS.Common.AcceptanceCriteria",
    "Microsoft.VSTS.TCM.ReproSteps",
    "System.State",
    "System.AssignedTo",
    "Microsoft.VSTS.Common.Priority",
    "Microsoft.VSTS.Scheduling.StoryPoints",
    "System.Tags",
];

/// Fields that never count as substantive on their own.
const NON_SUBSTANTIVE_FIELDS: &[&str] = &["System.IterationPath", "System.AreaPath", "System.ChangedDate", "System.Rev"];

fn changed_at(rev: &WorkItemRevisionDto) -> Option<DateTime<Utc>> {
    rev.fields
        .get("System.ChangedDate")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn changed_by(rev: &WorkItemRevisionDto) -> Option<String> {
    rev.fields
        .get("System.ChangedBy")
        .and_then(|v| v.get("displayName").or(Some(v)))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn created_at(rev: &WorkItemRevisionDto) -> Option<DateTime<Utc>> {
    rev.fields
        .get("System.CreatedDate")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_substantive_field(field: &str, extra_substantive: &[String]) -> bool {
    if NON_SUBSTANTIVE_FIELDS.contains(&field) {
        return false;
    }
    BUILTIN_SUBSTANTIVE_FIELDS.contains(&field) || extra_substantive.iter().any(|f| f == field)
}

/// Returns the substantive fields that changed between `prev` and `curr`.
fn substantive_diffs(prev: &WorkItemRevisionDto, curr: &WorkItemRevisionDto, extra_substantive: &[String]) -> Vec<String> {
    curr.fields
        .iter()
        .filter(|(field, value)| is_substantive_field(field, extra_substantive) && prev.fields.get(*field) != Some(*value))
        .map(|(field, _)| field.clone())
        .collect()
}

fn author_matches_automation(author: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| author.to_lowercase().contains(&pattern.to_lowercase()))
}

/// A diff set counts as substantive unless every differing field is
/// `System.State` and the author matches a configured automation pattern —
/// ADO bulk transitions (sprint close-out, automated workflows) move state
/// without a human behind the change.
fn is_bulk_auto_transition(diffs: &[String], author: &str, automation_patterns: &[String]) -> bool {
    !diffs.is_empty()
        && diffs.iter().all(|f| f == "System.State")
        && author_matches_automation(author, automation_patterns)
}

/// Classifies a work item's revision history and derives [`StalenessInfo`].
///
/// `revisions` must be ordered oldest-first, matching ADO's native order
/// for the revisions endpoint. The caller is responsible for bounding how
/// many recent revisions are passed in, so this function stays free of
/// fetch concerns.
pub fn classify(
    revisions: &[WorkItemRevisionDto],
    automation_patterns: &[String],
    substantive_fields: &[String],
    now: DateTime<Utc>,
) -> StalenessInfo {
    if revisions.is_empty() {
        return StalenessInfo::default();
    }

    let mut automated_skipped = 0u32;
    let mut found: Option<(DateTime<Utc>, String)> = None;

    for window in revisions.windows(2).rev() {
        let [prev, curr] = window else { continue };
        let author = changed_by(curr).unwrap_or_default();
        let diffs = substantive_diffs(prev, curr, substantive_fields);
        let substantive = !diffs.is_empty() && !is_bulk_auto_transition(&diffs, &author, automation_patterns);

        if substantive {
            if found.is_none() {
                if let Some(at) = changed_at(curr) {
                    found = Some((at, author));
                }
            }
        } else {
            automated_skipped += 1;
        }
    }

    match found {
        Some((at, by)) => StalenessInfo {
            last_substantive_change: Some(at),
            last_substantive_change_by: Some(by),
            days_inactive: Some((now - at).num_days().max(0)),
            automated_revisions_skipped: automated_skipped,
            all_changes_were_automated: false,
        },
        None => {
            let fallback = revisions
                .first()
                .and_then(created_at)
                .or_else(|| changed_at(&revisions[0]));
            StalenessInfo {
                last_substantive_change: fallback,
                last_substantive_change_by: None,
                days_inactive: fallback.map(|at| (now - at).num_days().max(0)),
                automated_revisions_skipped: automated_skipped,
                all_changes_were_automated: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rev(fields: &[(&str, Value)]) -> WorkItemRevisionDto {
        let mut map = HashMap::new();
        for (k, v) in fields {
            map.insert((*k).to_string(), v.clone());
        }
        WorkItemRevisionDto { rev: 0, fields: map }
    }

    fn iso(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn empty_history_yields_default() {
        let info = classify(&[], &[], &[], Utc::now());
        assert!(info.last_substantive_change.is_none());
        assert!(!info.all_changes_were_automated);
    }

    #[test]
    fn title_change_is_substantive() {
        let revisions = vec![
            rev(&[
                ("System.Title", iso("Old title")),
                ("System.ChangedDate", iso("2026-01-01T00:00:00Z")),
                ("System.ChangedBy", iso("Alice")),
            ]),
            rev(&[
                ("System.Title", iso("New title")),
                ("System.ChangedDate", iso("2026-01-02T00:00:00Z")),
                ("System.ChangedBy", iso("Alice")),
            ]),
        ];
        let now = DateTime::parse_from_rfc3339("2026-01-05T00:00:00Z").unwrap().with_timezone(&Utc);
        let info = classify(&revisions, &[], &[], now);
        assert!(!info.all_changes_were_automated);
        assert_eq!(info.days_inactive, Some(3));
        assert_eq!(info.last_substantive_change_by.as_deref(), Some("Alice"));
    }

    #[test]
    fn iteration_path_only_change_is_automated() {
        let revisions = vec![
            rev(&[
                ("System.IterationPath", iso("Sprint 1")),
                ("System.ChangedDate", iso("2026-01-01T00:00:00Z")),
                ("System.ChangedBy", iso("Bot")),
                ("System.CreatedDate", iso("2025-12-01T00:00:00Z")),
            ]),
            rev(&[
                ("System.IterationPath", iso("Sprint 2")),
                ("System.ChangedDate", iso("2026-01-02T00:00:00Z")),
                ("System.ChangedBy", iso("Bot")),
                ("System.CreatedDate", iso("2025-12-01T00:00:00Z")),
            ]),
        ];
        let now = Utc::now();
        let info = classify(&revisions, &[], &[], now);
        assert!(info.all_changes_were_automated);
        assert_eq!(info.automated_revisions_skipped, 1);
    }

    #[test]
    fn extra_substantive_field_is_honored() {
        let revisions = vec![
            rev(&[("Custom.RiskLevel", iso("Low")), ("System.ChangedDate", iso("2026-01-01T00:00:00Z")), ("System.ChangedBy", iso("Alice"))]),
            rev(&[("Custom.RiskLevel", iso("High")), ("System.ChangedDate", iso("2026-01-02T00:00:00Z")), ("System.ChangedBy", iso("Alice"))]),
        ];
        let extra = vec!["Custom.RiskLevel".to_string()];
        let info = classify(&revisions, &[], &extra, Utc::now());
        assert!(!info.all_changes_were_automated);
    }

    #[test]
    fn bulk_state_transition_by_automation_author_is_not_substantive() {
        let revisions = vec![
            rev(&[
                ("System.State", iso("Active")),
                ("System.ChangedDate", iso("2026-01-01T00:00:00Z")),
                ("System.ChangedBy", iso("Alice")),
                ("System.CreatedDate", iso("2025-12-01T00:00:00Z")),
            ]),
            rev(&[
                ("System.State", iso("Closed")),
                ("System.ChangedDate", iso("2026-01-02T00:00:00Z")),
                ("System.ChangedBy", iso("Sprint Closeout Bot")),
                ("System.CreatedDate", iso("2025-12-01T00:00:00Z")),
            ]),
        ];
        let patterns = vec!["bot".to_string()];
        let info = classify(&revisions, &patterns, &[], Utc::now());
        assert!(info.all_changes_were_automated);
    }

    #[test]
    fn automated_pairs_older_than_the_newest_substantive_change_are_still_counted() {
        let revisions = vec![
            rev(&[
                ("System.Title", iso("Created")),
                ("System.ChangedDate", iso("2026-01-01T00:00:00Z")),
                ("System.ChangedBy", iso("Alice")),
            ]),
            rev(&[
                ("System.Title", iso("Created")),
                ("System.AreaPath", iso("Team A")),
                ("System.ChangedDate", iso("2026-01-02T00:00:00Z")),
                ("System.ChangedBy", iso("Build Service")),
            ]),
            rev(&[
                ("System.Title", iso("Created")),
                ("System.AreaPath", iso("Team A")),
                ("System.IterationPath", iso("Sprint 2")),
                ("System.ChangedDate", iso("2026-01-03T00:00:00Z")),
                ("System.ChangedBy", iso("Build Service")),
            ]),
            rev(&[
                ("System.Title", iso("Created")),
                ("System.AreaPath", iso("Team A")),
                ("System.IterationPath", iso("Sprint 2")),
                ("System.Description", iso("Now with details")),
                ("System.ChangedDate", iso("2026-01-04T00:00:00Z")),
                ("System.ChangedBy", iso("U")),
            ]),
        ];
        let info = classify(&revisions, &[], &[], Utc::now());
        assert_eq!(info.automated_revisions_skipped, 2);
        assert!(!info.all_changes_were_automated);
        assert_eq!(info.last_substantive_change_by.as_deref(), Some("U"));
    }

    #[test]
    fn human_state_transition_is_substantive() {
        let revisions = vec![
            rev(&[
                ("System.State", iso("Active")),
                ("System.ChangedDate", iso("2026-01-01T00:00:00Z")),
                ("System.ChangedBy", iso("Alice")),
            ]),
            rev(&[
                ("System.State", iso("Closed")),
                ("System.ChangedDate", iso("2026-01-02T00:00:00Z")),
                ("System.ChangedBy", iso("Alice")),
            ]),
        ];
        let info = classify(&revisions, &["bot".to_string()], &[], Utc::now());
        assert!(!info.all_changes_were_automated);
    }
}
