//! Tracker records: full reads, partial webhook snapshots, and field updates.

use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a nullable field so that an explicit `null` is kept apart from an absent key.
///
/// Absent keys fall back to `None` via `#[serde(default)]`; a present key (even `null`)
/// becomes `Some(..)`.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Issue label (id, name, optional parent group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Writable SLA fields. `None` means the field is unset on the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaTriplet {
    pub sla_type: Option<String>,
    pub sla_started_at: Option<String>,
    pub sla_breaches_at: Option<String>,
}

/// A record as read from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub sla_type: Option<String>,
    #[serde(default)]
    pub sla_started_at: Option<String>,
    #[serde(default)]
    pub sla_breaches_at: Option<String>,
    /// Derived by the tracker; read-only.
    #[serde(default)]
    pub sla_high_risk_at: Option<String>,
    /// Derived by the tracker; read-only.
    #[serde(default)]
    pub sla_medium_risk_at: Option<String>,
}

impl Record {
    pub fn label_ids(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.id.clone()).collect()
    }

    pub fn sla(&self) -> SlaTriplet {
        SlaTriplet {
            sla_type: self.sla_type.clone(),
            sla_started_at: self.sla_started_at.clone(),
            sla_breaches_at: self.sla_breaches_at.clone(),
        }
    }

    /// Full snapshot of the record; every protected field is present.
    pub fn to_snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            id: Some(self.id.clone()),
            identifier: Some(self.identifier.clone()),
            title: Some(self.title.clone()),
            label_ids: Some(self.label_ids()),
            labels: Some(self.labels.clone()),
            priority: Some(self.priority),
            sla_type: Some(self.sla_type.clone()),
            sla_started_at: Some(self.sla_started_at.clone()),
            sla_breaches_at: Some(self.sla_breaches_at.clone()),
            sla_high_risk_at: Some(self.sla_high_risk_at.clone()),
            sla_medium_risk_at: Some(self.sla_medium_risk_at.clone()),
        }
    }
}

/// Partial record state carried by a webhook (`data` or `updatedFrom`).
///
/// Every field is optional: a field is only present when the sender included it.
/// Nullable SLA fields use `Option<Option<_>>` so that "was null" and "not sent" differ.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_started_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_breaches_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_high_risk_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_medium_risk_at: Option<Option<String>>,
}

impl RecordSnapshot {
    /// Label ids, taken from `labelIds` or, failing that, from embedded label objects.
    pub fn label_id_list(&self) -> Option<Vec<String>> {
        if let Some(ref ids) = self.label_ids {
            return Some(ids.clone());
        }
        self.labels
            .as_ref()
            .map(|labels| labels.iter().map(|l| l.id.clone()).collect())
    }

    pub fn has_sla_fields(&self) -> bool {
        self.sla_type.is_some()
            || self.sla_started_at.is_some()
            || self.sla_breaches_at.is_some()
            || self.sla_high_risk_at.is_some()
            || self.sla_medium_risk_at.is_some()
    }
}

/// Partial update sent to the tracker. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_started_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_breaches_at: Option<Option<String>>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.label_ids.is_none() && self.priority.is_none() && !self.touches_sla()
    }

    pub fn touches_sla(&self) -> bool {
        self.sla_type.is_some() || self.sla_started_at.is_some() || self.sla_breaches_at.is_some()
    }

    /// Split into (everything except SLA, SLA only).
    pub fn split_sla(self) -> (RecordUpdate, RecordUpdate) {
        let sla = RecordUpdate {
            sla_type: self.sla_type,
            sla_started_at: self.sla_started_at,
            sla_breaches_at: self.sla_breaches_at,
            ..Default::default()
        };
        let rest = RecordUpdate {
            label_ids: self.label_ids,
            priority: self.priority,
            ..Default::default()
        };
        (rest, sla)
    }
}

/// Human-readable priority name (0 = none, 1 = most urgent).
pub fn priority_label(priority: u8) -> String {
    match priority {
        0 => "No priority".to_string(),
        1 => "Urgent".to_string(),
        2 => "High".to_string(),
        3 => "Medium".to_string(),
        4 => "Low".to_string(),
        n => format!("Priority {}", n),
    }
}
