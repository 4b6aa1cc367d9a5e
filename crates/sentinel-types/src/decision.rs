//! Change detections and per-event enforcement results.

use serde::{Deserialize, Serialize};

/// A field the sentinel defends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtectedField {
    Labels,
    Priority,
    SlaType,
    SlaStartedAt,
    SlaBreachesAt,
    SlaHighRiskAt,
    SlaMediumRiskAt,
}

impl ProtectedField {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtectedField::Labels => "labels",
            ProtectedField::Priority => "priority",
            ProtectedField::SlaType => "slaType",
            ProtectedField::SlaStartedAt => "slaStartedAt",
            ProtectedField::SlaBreachesAt => "slaBreachesAt",
            ProtectedField::SlaHighRiskAt => "slaHighRiskAt",
            ProtectedField::SlaMediumRiskAt => "slaMediumRiskAt",
        }
    }

    pub fn is_sla(self) -> bool {
        !matches!(self, ProtectedField::Labels | ProtectedField::Priority)
    }

    /// SLA fields the tracker accepts in an update; the risk timestamps are derived.
    pub fn is_writable_sla(self) -> bool {
        matches!(
            self,
            ProtectedField::SlaType | ProtectedField::SlaStartedAt | ProtectedField::SlaBreachesAt
        )
    }
}

impl std::fmt::Display for ProtectedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protected field that differs between previous and current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetection {
    pub field: ProtectedField,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub description: String,
    pub revert_description: String,
}

/// Why an event was not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SelfAction,
    RecordRemoved,
    NoProtectedLabel,
    ProtectedLabelAdded,
    NoRelevantChanges,
    Authorized,
    DryRun,
    NotifyOnly,
    /// Violations found, but no trustworthy value exists to restore.
    NothingToRestore,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::SelfAction => "self",
            SkipReason::RecordRemoved => "record removed",
            SkipReason::NoProtectedLabel => "no protected label",
            SkipReason::ProtectedLabelAdded => "protected label added",
            SkipReason::NoRelevantChanges => "no relevant changes",
            SkipReason::Authorized => "authorized",
            SkipReason::DryRun => "dry run",
            SkipReason::NotifyOnly => "notify only",
            SkipReason::NothingToRestore => "nothing to restore",
        }
    }
}

/// Decision for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EnforcementResult {
    NotEnforced {
        reason: SkipReason,
        changes: Vec<ChangeDetection>,
    },
    Enforced {
        changes: Vec<ChangeDetection>,
    },
}

impl EnforcementResult {
    pub fn skipped(reason: SkipReason) -> Self {
        EnforcementResult::NotEnforced {
            reason,
            changes: Vec::new(),
        }
    }

    pub fn enforced(&self) -> bool {
        matches!(self, EnforcementResult::Enforced { .. })
    }

    pub fn reason(&self) -> &'static str {
        match self {
            EnforcementResult::NotEnforced { reason, .. } => reason.as_str(),
            EnforcementResult::Enforced { .. } => "reverted",
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            EnforcementResult::NotEnforced { reason, .. } => Some(*reason),
            EnforcementResult::Enforced { .. } => None,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.skip_reason() == Some(SkipReason::DryRun)
    }

    pub fn changes(&self) -> &[ChangeDetection] {
        match self {
            EnforcementResult::NotEnforced { changes, .. } => changes,
            EnforcementResult::Enforced { changes } => changes,
        }
    }

    pub fn summary(&self) -> EnforcementSummary {
        EnforcementSummary {
            enforced: self.enforced(),
            reason: self.reason().to_string(),
            changes: self.changes().to_vec(),
            dry_run: self.dry_run().then_some(true),
        }
    }
}

/// Flat JSON view of an [`EnforcementResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementSummary {
    pub enforced: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}
