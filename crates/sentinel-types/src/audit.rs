//! Audit entries: one per enforcement decision that reached the authorization step.

use crate::ChangeDetection;
use serde::{Deserialize, Serialize};

/// What the sentinel did about a detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Authorized,
    DryRun,
    NotifyOnly,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub entry_id: String,
    pub timestamp: String,
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_identifier: Option<String>,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_email: Option<String>,
    pub actor_name: String,
    pub action: AuditAction,
    pub changes: Vec<ChangeDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
}

/// Options for listing audit entries (filter + pagination).
#[derive(Debug, Clone, Default)]
pub struct AuditListOptions {
    pub record_id: Option<String>,
    pub actor_id: Option<String>,
    /// RFC 3339 instant; entries stamped at or after it. Any offset is accepted.
    pub since: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
