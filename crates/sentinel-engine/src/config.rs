//! Enforcement settings: protected labels, who may change them, and how to react.

use sentinel_types::Actor;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Delay between the priority write and the SLA write of a two-phase revert.
pub const DEFAULT_REVERT_DELAY: Duration = Duration::from_millis(1500);

/// What to do with an unauthorized change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnforcementMode {
    #[default]
    Enforce,
    /// Log the revert that would happen; write nothing.
    DryRun,
    /// Comment on the record; do not revert.
    NotifyOnly,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown enforcement mode: {0}")]
pub struct ParseModeError(pub String);

impl FromStr for EnforcementMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "enforce" | "revert" => Ok(EnforcementMode::Enforce),
            "dry-run" | "dryrun" => Ok(EnforcementMode::DryRun),
            "notify-only" | "notify" => Ok(EnforcementMode::NotifyOnly),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// The engine's own tracker identity. Its writes re-trigger webhooks and must be ignored.
#[derive(Debug, Clone, Default)]
pub struct AgentIdentity {
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl AgentIdentity {
    /// Match by id, by email, or by name when the actor is an integration.
    pub fn matches(&self, actor: &Actor) -> bool {
        if self.id.as_deref() == Some(actor.id.as_str()) {
            return true;
        }
        if let (Some(mine), Some(theirs)) = (self.email.as_deref(), actor.email.as_deref()) {
            if mine.eq_ignore_ascii_case(theirs) {
                return true;
            }
        }
        match self.name.as_deref() {
            Some(name) => actor.is_integration && !actor.name.is_empty() && actor.name == name,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none() && self.name.is_none()
    }
}

/// Actors allowed to change protected fields, by id or email.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<String>,
    emails: HashSet<String>,
}

impl AllowList {
    pub fn new<I, E>(ids: I, emails: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn permits(&self, actor: &Actor) -> bool {
        self.ids.contains(&actor.id)
            || actor
                .email
                .as_deref()
                .map(|e| self.emails.contains(&e.to_ascii_lowercase()))
                .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.ids.len() + self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.emails.is_empty()
    }
}

/// Everything the decision pipeline needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    /// Lowercased protected label names.
    protected_labels: HashSet<String>,
    pub allow_list: AllowList,
    pub agent: AgentIdentity,
    pub mode: EnforcementMode,
    pub revert_delay: Duration,
}

impl EnforcementConfig {
    pub fn new<I>(protected_labels: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            protected_labels: protected_labels
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
            allow_list: AllowList::default(),
            agent: AgentIdentity::default(),
            mode: EnforcementMode::default(),
            revert_delay: DEFAULT_REVERT_DELAY,
        }
    }

    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn with_agent(mut self, agent: AgentIdentity) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_mode(mut self, mode: EnforcementMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_revert_delay(mut self, delay: Duration) -> Self {
        self.revert_delay = delay;
        self
    }

    /// Case-insensitive membership in the protected set.
    pub fn is_protected_name(&self, name: &str) -> bool {
        self.protected_labels.contains(&name.trim().to_lowercase())
    }

    pub fn protected_label_count(&self) -> usize {
        self.protected_labels.len()
    }
}
