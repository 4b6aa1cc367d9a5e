//! State cache entries: last-known-good protected field values per record.

use crate::{present, Record, RecordSnapshot, SlaTriplet};
use serde::{Deserialize, Serialize};

/// Cached baseline for one record.
///
/// For the SLA fields the outer `Option` records whether the value was ever observed;
/// `Some(None)` means the field was observed unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_started_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sla_breaches_at: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    pub cached_at: String,
}

/// Partial update merged into a [`CacheEntry`]; absent fields keep their cached value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePatch {
    pub sla_type: Option<Option<String>>,
    pub sla_started_at: Option<Option<String>>,
    pub sla_breaches_at: Option<Option<String>>,
    pub priority: Option<u8>,
}

impl CachePatch {
    /// Protected values present in a webhook snapshot.
    pub fn from_snapshot(snapshot: &RecordSnapshot) -> Self {
        Self {
            sla_type: snapshot.sla_type.clone(),
            sla_started_at: snapshot.sla_started_at.clone(),
            sla_breaches_at: snapshot.sla_breaches_at.clone(),
            priority: snapshot.priority,
        }
    }

    /// Protected values of a fully read record.
    pub fn from_record(record: &Record) -> Self {
        Self::from_sla(&record.sla(), Some(record.priority))
    }

    pub fn from_sla(sla: &SlaTriplet, priority: Option<u8>) -> Self {
        Self {
            sla_type: Some(sla.sla_type.clone()),
            sla_started_at: Some(sla.sla_started_at.clone()),
            sla_breaches_at: Some(sla.sla_breaches_at.clone()),
            priority,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sla_type.is_none()
            && self.sla_started_at.is_none()
            && self.sla_breaches_at.is_none()
            && self.priority.is_none()
    }

    /// True when applying the patch would change a cached value.
    pub fn differs_from(&self, entry: &CacheEntry) -> bool {
        fn changes<T: PartialEq>(patch: &Option<T>, cached: &Option<T>) -> bool {
            matches!(patch, Some(_)) && patch != cached
        }
        changes(&self.sla_type, &entry.sla_type)
            || changes(&self.sla_started_at, &entry.sla_started_at)
            || changes(&self.sla_breaches_at, &entry.sla_breaches_at)
            || changes(&self.priority, &entry.priority)
    }

    /// Merge into `entry` (or a fresh one), stamping `cached_at`.
    pub fn apply(self, entry: Option<CacheEntry>, cached_at: String) -> CacheEntry {
        let mut e = entry.unwrap_or_default();
        if let Some(v) = self.sla_type {
            e.sla_type = Some(v);
        }
        if let Some(v) = self.sla_started_at {
            e.sla_started_at = Some(v);
        }
        if let Some(v) = self.sla_breaches_at {
            e.sla_breaches_at = Some(v);
        }
        if let Some(p) = self.priority {
            e.priority = Some(p);
        }
        e.cached_at = cached_at;
        e
    }
}
