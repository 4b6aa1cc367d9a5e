//! Revert planning: which values to write back and where they come from.

use sentinel_types::{CacheEntry, CachePatch, ChangeDetection, ProtectedField, RecordSnapshot, RecordUpdate};

/// The corrective write for one decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevertPlan {
    pub update: RecordUpdate,
}

impl RevertPlan {
    /// Builds the restore update from `previous` first and the pre-revert cache entry second.
    /// The record's current values are never a source.
    pub fn build(
        record_id: &str,
        changes: &[ChangeDetection],
        previous: &RecordSnapshot,
        cached: Option<&CacheEntry>,
    ) -> Self {
        let mut update = RecordUpdate::default();
        let touched = |f: ProtectedField| changes.iter().any(|c| c.field == f);

        if touched(ProtectedField::Labels) {
            update.label_ids = previous.label_id_list();
        }

        let priority_changed = touched(ProtectedField::Priority);
        if priority_changed {
            update.priority = previous.priority.or_else(|| cached.and_then(|c| c.priority));
        }

        let sla_changed = changes.iter().any(|c| c.field.is_writable_sla());
        if sla_changed || priority_changed {
            update.sla_type = previous
                .sla_type
                .clone()
                .or_else(|| cached.and_then(|c| c.sla_type.clone()));
            update.sla_started_at = previous
                .sla_started_at
                .clone()
                .or_else(|| cached.and_then(|c| c.sla_started_at.clone()));
            update.sla_breaches_at = previous
                .sla_breaches_at
                .clone()
                .or_else(|| cached.and_then(|c| c.sla_breaches_at.clone()));

            if !update.touches_sla() {
                tracing::warn!(
                    record_id = %record_id,
                    "no trustworthy SLA baseline (event carried no previous SLA, no cache entry); SLA will not be restored"
                );
            }
        }

        Self { update }
    }

    pub fn is_empty(&self) -> bool {
        self.update.is_empty()
    }

    /// Priority and SLA both need writing, so the SLA write must land after the tracker's
    /// own recalculation.
    pub fn is_two_phase(&self) -> bool {
        self.update.priority.is_some() && self.update.touches_sla()
    }

    /// True when applying the plan writes `field`. The risk timestamps are derived and never written.
    pub fn writes(&self, field: ProtectedField) -> bool {
        let u = &self.update;
        match field {
            ProtectedField::Labels => u.label_ids.is_some(),
            ProtectedField::Priority => u.priority.is_some(),
            ProtectedField::SlaType => u.sla_type.is_some(),
            ProtectedField::SlaStartedAt => u.sla_started_at.is_some(),
            ProtectedField::SlaBreachesAt => u.sla_breaches_at.is_some(),
            ProtectedField::SlaHighRiskAt | ProtectedField::SlaMediumRiskAt => false,
        }
    }

    /// Values the record holds once the plan has been applied.
    pub fn restored(&self) -> CachePatch {
        CachePatch {
            sla_type: self.update.sla_type.clone(),
            sla_started_at: self.update.sla_started_at.clone(),
            sla_breaches_at: self.update.sla_breaches_at.clone(),
            priority: self.update.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(field: ProtectedField) -> ChangeDetection {
        ChangeDetection {
            field,
            old_value: json!(null),
            new_value: json!(null),
            description: String::new(),
            revert_description: String::new(),
        }
    }

    fn cached() -> CacheEntry {
        CacheEntry {
            sla_type: Some(Some("all".into())),
            sla_started_at: Some(Some("2024-05-01T00:00:00.000Z".into())),
            sla_breaches_at: Some(Some("2024-05-08T00:00:00.000Z".into())),
            priority: Some(4),
            cached_at: "2024-05-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn labels_restore_the_full_previous_set() {
        let previous = RecordSnapshot {
            label_ids: Some(vec!["a".into(), "v".into()]),
            ..Default::default()
        };
        let plan = RevertPlan::build("i1", &[change(ProtectedField::Labels)], &previous, None);
        assert_eq!(plan.update.label_ids, Some(vec!["a".to_string(), "v".to_string()]));
        assert!(!plan.update.touches_sla());
        assert!(!plan.is_two_phase());
    }

    #[test]
    fn priority_pulls_sla_from_cache_when_event_lacks_it() {
        let previous = RecordSnapshot {
            priority: Some(3),
            ..Default::default()
        };
        let entry = cached();
        let plan = RevertPlan::build("i1", &[change(ProtectedField::Priority)], &previous, Some(&entry));
        assert_eq!(plan.update.priority, Some(3));
        assert_eq!(plan.update.sla_type, Some(Some("all".to_string())));
        assert!(plan.is_two_phase());
        assert_eq!(plan.restored().priority, Some(3));
    }

    #[test]
    fn previous_state_beats_cache() {
        let previous = RecordSnapshot {
            sla_breaches_at: Some(None),
            ..Default::default()
        };
        let entry = cached();
        let plan = RevertPlan::build("i1", &[change(ProtectedField::SlaBreachesAt)], &previous, Some(&entry));
        assert_eq!(plan.update.sla_breaches_at, Some(None));
        assert_eq!(plan.update.sla_type, Some(Some("all".to_string())));
    }

    #[test]
    fn no_sla_source_skips_sla_write() {
        let previous = RecordSnapshot {
            priority: Some(2),
            ..Default::default()
        };
        let plan = RevertPlan::build("i1", &[change(ProtectedField::Priority)], &previous, None);
        assert_eq!(plan.update.priority, Some(2));
        assert!(!plan.update.touches_sla());
        assert!(!plan.is_two_phase());
    }

    #[test]
    fn derived_sla_fields_alone_leave_nothing_to_write() {
        let plan = RevertPlan::build(
            "i1",
            &[change(ProtectedField::SlaHighRiskAt)],
            &RecordSnapshot::default(),
            Some(&cached()),
        );
        assert!(plan.is_empty());
        assert!(!plan.writes(ProtectedField::SlaHighRiskAt));
    }

    #[test]
    fn writes_reports_only_fields_with_a_source() {
        let previous = RecordSnapshot {
            label_ids: Some(vec!["a".into()]),
            sla_breaches_at: Some(Some("2024-05-08T00:00:00.000Z".into())),
            ..Default::default()
        };
        let changes = [
            change(ProtectedField::Labels),
            change(ProtectedField::SlaBreachesAt),
            change(ProtectedField::SlaHighRiskAt),
        ];
        let plan = RevertPlan::build("i1", &changes, &previous, None);
        assert!(plan.writes(ProtectedField::Labels));
        assert!(plan.writes(ProtectedField::SlaBreachesAt));
        assert!(!plan.writes(ProtectedField::SlaType));
        assert!(!plan.writes(ProtectedField::Priority));
        assert!(!plan.writes(ProtectedField::SlaHighRiskAt));
    }
}
