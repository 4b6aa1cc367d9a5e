//! Field-by-field comparison of current and previous state.

use crate::config::EnforcementConfig;
use crate::labels::LabelResolver;
use sentinel_types::{priority_label, ChangeDetection, ClientError, ProtectedField, RecordSnapshot};
use serde_json::json;
use std::collections::HashSet;

pub(crate) const SLA_COLLAPSED: &str = "Modified SLA settings";
pub(crate) const SLA_COLLAPSED_REVERT: &str = "Restored SLA settings";

/// Ids in `previous` that are missing from `current`, and the reverse, in list order.
pub(crate) fn label_diff(previous: &[String], current: &[String]) -> (Vec<String>, Vec<String>) {
    let prev: HashSet<&String> = previous.iter().collect();
    let cur: HashSet<&String> = current.iter().collect();
    let removed = previous.iter().filter(|id| !cur.contains(id)).cloned().collect();
    let added = current.iter().filter(|id| !prev.contains(id)).cloned().collect();
    (removed, added)
}

/// Detects protected-field changes. Only removed label ids are resolved through the client.
pub(crate) async fn detect_changes(
    config: &EnforcementConfig,
    resolver: &mut LabelResolver<'_>,
    previous: &RecordSnapshot,
    current: &RecordSnapshot,
) -> Result<Vec<ChangeDetection>, ClientError> {
    let mut changes = Vec::new();

    if let (Some(prev_ids), Some(cur_ids)) = (previous.label_id_list(), current.label_id_list()) {
        if let Some(change) = detect_labels(config, resolver, &prev_ids, &cur_ids).await? {
            changes.push(change);
        }
    }

    let sla = detect_sla(previous, current);

    if let (Some(old), Some(new)) = (previous.priority, current.priority) {
        if old != new {
            let mut description = format!(
                "Changed priority from {} to {}",
                priority_label(old),
                priority_label(new)
            );
            if !sla.is_empty() {
                description.push_str(" (SLA was recalculated as a result)");
            }
            changes.push(ChangeDetection {
                field: ProtectedField::Priority,
                old_value: json!(old),
                new_value: json!(new),
                description,
                revert_description: format!("Restored priority to {}", priority_label(old)),
            });
        }
    }

    changes.extend(sla);
    Ok(changes)
}

async fn detect_labels(
    config: &EnforcementConfig,
    resolver: &mut LabelResolver<'_>,
    prev_ids: &[String],
    cur_ids: &[String],
) -> Result<Option<ChangeDetection>, ClientError> {
    let (removed, added) = label_diff(prev_ids, cur_ids);
    if removed.is_empty() && added.is_empty() {
        return Ok(None);
    }

    let removed_labels = resolver.resolve_all(&removed).await?;
    let protected_removed: Vec<_> = removed_labels
        .iter()
        .filter(|l| config.is_protected_name(&l.name))
        .collect();

    for id in &added {
        if let Some(label) = resolver.cached(id) {
            if config.is_protected_name(&label.name) {
                tracing::info!(label = %label.name, "protected label added");
            }
        }
    }

    if protected_removed.is_empty() {
        return Ok(None);
    }

    // A removal paired with an addition under the same parent is a group swap.
    for label in &protected_removed {
        let Some(ref group) = label.parent_id else {
            continue;
        };
        let replacement = added
            .iter()
            .filter_map(|id| resolver.cached(id))
            .find(|l| l.parent_id.as_deref() == Some(group.as_str()));
        if let Some(replacement) = replacement {
            tracing::warn!(
                removed = %label.name,
                added = %replacement.name,
                group = %group,
                "protected label replaced within its group; restoring the full previous label set"
            );
        }
    }

    let names: Vec<&str> = protected_removed.iter().map(|l| l.name.as_str()).collect();
    let names = names.join(", ");
    Ok(Some(ChangeDetection {
        field: ProtectedField::Labels,
        old_value: json!(prev_ids),
        new_value: json!(cur_ids),
        description: format!("Removed protected label(s): {}", names),
        revert_description: format!("Restored label(s): {}", names),
    }))
}

fn sla_fields(
    snapshot: &RecordSnapshot,
) -> [(ProtectedField, &'static str, &Option<Option<String>>); 5] {
    [
        (ProtectedField::SlaType, "SLA type", &snapshot.sla_type),
        (ProtectedField::SlaStartedAt, "SLA start", &snapshot.sla_started_at),
        (ProtectedField::SlaBreachesAt, "SLA breach time", &snapshot.sla_breaches_at),
        (ProtectedField::SlaHighRiskAt, "SLA high-risk time", &snapshot.sla_high_risk_at),
        (ProtectedField::SlaMediumRiskAt, "SLA medium-risk time", &snapshot.sla_medium_risk_at),
    ]
}

fn display(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("none")
}

fn detect_sla(previous: &RecordSnapshot, current: &RecordSnapshot) -> Vec<ChangeDetection> {
    let mut out: Vec<ChangeDetection> = sla_fields(previous)
        .into_iter()
        .zip(sla_fields(current))
        .filter_map(|((field, label, old), (_, _, new))| match (old, new) {
            (Some(old), Some(new)) if old != new => Some(ChangeDetection {
                field,
                old_value: json!(old),
                new_value: json!(new),
                description: format!("Changed {} from {} to {}", label, display(old), display(new)),
                revert_description: format!("Restored {} to {}", label, display(old)),
            }),
            _ => None,
        })
        .collect();

    if out.len() >= 2 {
        for change in &mut out {
            change.description = SLA_COLLAPSED.to_string();
            change.revert_description = SLA_COLLAPSED_REVERT.to_string();
        }
    }
    out
}
