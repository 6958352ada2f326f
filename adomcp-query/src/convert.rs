//! Translates ADO wire DTOs into the domain's `ItemContext`/`WorkItemSnapshot`.

use adomcp_client::wire::{WorkItemDto, WorkItemRelationDto};
use adomcp_types::{FieldValue, Identity, ItemContext, StalenessInfo, WorkItemRelation, WorkItemSnapshot};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Field reference names always fetched, regardless of caller-requested fields.
pub const ALWAYS_ON_FIELDS: &[&str] = &[
    "System.Id",
    "System.Title",
    "System.State",
    "System.WorkItemType",
    "System.AssignedTo",
    "System.Tags",
    "System.AreaPath",
    "System.IterationPath",
    "Microsoft.VSTS.Common.Priority",
    "Microsoft.VSTS.Scheduling.StoryPoints",
    "System.CreatedDate",
    "System.ChangedDate",
    "System.Description",
    "Microsoft.VSTS.Common.AcceptanceCriteria",
];

fn field_value(raw: &Value) -> FieldValue {
    match raw {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or_default()),
        Value::String(s) => FieldValue::String(s.clone()),
        Value::Object(map) => {
            let display_name = map.get("displayName").and_then(Value::as_str).unwrap_or_default();
            let unique_name = map.get("uniqueName").and_then(Value::as_str).unwrap_or_default();
            let id = map.get("id").and_then(Value::as_str).unwrap_or_default();
            FieldValue::Identity(Identity {
                display_name: display_name.to_string(),
                unique_name: unique_name.to_string(),
                id: id.to_string(),
            })
        }
        Value::Array(_) => FieldValue::Null,
    }
}

fn string_field(dto: &WorkItemDto, name: &str) -> Option<String> {
    dto.fields.get(name).and_then(Value::as_str).map(str::to_owned)
}

fn identity_unique_name(dto: &WorkItemDto, name: &str) -> Option<String> {
    dto.fields
        .get(name)
        .and_then(|v| v.get("uniqueName"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn datetime_field(dto: &WorkItemDto, name: &str) -> DateTime<Utc> {
    dto.fields
        .get(name)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn tags(dto: &WorkItemDto) -> Vec<String> {
    dto.fields
        .get("System.Tags")
        .and_then(Value::as_str)
        .map(|raw| raw.split(';').map(str::trim).filter(|t| !t.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Builds an `ItemContext` at position `index`, before staleness enrichment.
pub fn to_item_context(index: usize, dto: &WorkItemDto) -> ItemContext {
    let description_empty = dto
        .fields
        .get("System.Description")
        .and_then(Value::as_str)
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);
    let acceptance_empty = dto
        .fields
        .get("Microsoft.VSTS.Common.AcceptanceCriteria")
        .and_then(Value::as_str)
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);

    ItemContext {
        index,
        id: dto.id,
        title: string_field(dto, "System.Title").unwrap_or_default(),
        state: string_field(dto, "System.State").unwrap_or_default(),
        item_type: string_field(dto, "System.WorkItemType").unwrap_or_default(),
        assigned_to: identity_unique_name(dto, "System.AssignedTo"),
        tags: tags(dto),
        priority: dto.fields.get("Microsoft.VSTS.Common.Priority").and_then(Value::as_i64),
        story_points: dto.fields.get("Microsoft.VSTS.Scheduling.StoryPoints").and_then(Value::as_f64),
        created_date: datetime_field(dto, "System.CreatedDate"),
        changed_date: datetime_field(dto, "System.ChangedDate"),
        staleness: StalenessInfo::default(),
        missing_description: description_empty,
        missing_acceptance_criteria: acceptance_empty,
    }
}

/// Builds a full `WorkItemSnapshot`, used when `fetchFullPackages` is requested.
pub fn to_snapshot(dto: &WorkItemDto) -> WorkItemSnapshot {
    WorkItemSnapshot {
        id: dto.id,
        rev_at_capture: dto.rev,
        fields: dto.fields.iter().map(|(k, v)| (k.clone(), field_value(v))).collect(),
        relations: dto.relations.iter().map(to_relation).collect(),
    }
}

fn to_relation(dto: &WorkItemRelationDto) -> WorkItemRelation {
    WorkItemRelation {
        rel_type: dto.rel.clone(),
        target_url: dto.url.clone(),
        attributes: dto.attributes.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn dto_with(fields: &[(&str, Value)]) -> WorkItemDto {
        let mut map = HashMap::new();
        for (k, v) in fields {
            map.insert((*k).to_string(), v.clone());
        }
        WorkItemDto {
            id: 42,
            rev: 3,
            fields: map,
            relations: vec![],
        }
    }

    #[test]
    fn missing_description_defaults_to_true() {
        let dto = dto_with(&[("System.Title", Value::String("x".into()))]);
        let ctx = to_item_context(0, &dto);
        assert!(ctx.missing_description);
    }

    #[test]
    fn tags_split_and_trim() {
        let dto = dto_with(&[("System.Tags", Value::String("a; b ;c".into()))]);
        let ctx = to_item_context(0, &dto);
        assert_eq!(ctx.tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn identity_field_extracts_unique_name() {
        let dto = dto_with(&[(
            "System.AssignedTo",
            serde_json::json!({"displayName": "Alice", "uniqueName": "alice@contoso.com", "id": "1"}),
        )]);
        let ctx = to_item_context(0, &dto);
        assert_eq!(ctx.assigned_to.as_deref(), Some("alice@contoso.com"));
    }
}
