//! Inbound webhook payloads and the normalized change event the engine consumes.

use crate::RecordSnapshot;
use serde::{Deserialize, Serialize};

/// What happened to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    FieldUpdate,
    SlaRecomputed,
    RecordRemoved,
}

/// Who made the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_integration: bool,
}

/// One normalized change notification.
///
/// `previous` is never guaranteed complete: the tracker only includes fields it
/// believes changed, and `slaRecomputed` events never carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub record_id: String,
    pub kind: EventKind,
    pub actor: Actor,
    pub current: RecordSnapshot,
    #[serde(default)]
    pub previous: Option<RecordSnapshot>,
    #[serde(default)]
    pub webhook_id: Option<String>,
}

/// Actor block of a Linear webhook.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookActor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "type", default)]
    pub actor_type: Option<String>,
}

/// Raw Linear webhook body: `{type, action, actor, data, updatedFrom?, webhookTimestamp, webhookId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub actor: Option<WebhookActor>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub updated_from: Option<RecordSnapshot>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub webhook_timestamp: Option<i64>,
    #[serde(default)]
    pub webhook_id: Option<String>,
}

/// Outcome of normalizing a webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Event(Box<ChangeEvent>),
    Ignored(&'static str),
}

impl WebhookPayload {
    /// Map the payload onto a [`ChangeEvent`], or explain why it is not one.
    pub fn normalize(self) -> Result<Normalized, serde_json::Error> {
        let kind = match (self.kind.as_str(), self.action.as_str()) {
            ("Issue", "remove") => EventKind::RecordRemoved,
            ("Issue", _) => EventKind::FieldUpdate,
            ("IssueSLA", _) => EventKind::SlaRecomputed,
            _ => return Ok(Normalized::Ignored("unsupported event type")),
        };
        let actor = match self.actor {
            Some(a) => Actor {
                is_integration: a
                    .actor_type
                    .as_deref()
                    .map(|t| !t.eq_ignore_ascii_case("user"))
                    .unwrap_or(false),
                name: a.name.unwrap_or_default(),
                email: a.email,
                id: a.id,
            },
            None => return Ok(Normalized::Ignored("system-generated event")),
        };
        let data = match kind {
            EventKind::SlaRecomputed => self.data.get("issue").cloned().unwrap_or(self.data),
            _ => self.data,
        };
        let current: RecordSnapshot = serde_json::from_value(data)?;
        let record_id = match current.id.clone() {
            Some(id) => id,
            None => return Ok(Normalized::Ignored("missing record id")),
        };
        let previous = match kind {
            EventKind::SlaRecomputed => None,
            _ => self.updated_from,
        };
        Ok(Normalized::Event(Box::new(ChangeEvent {
            record_id,
            kind,
            actor,
            current,
            previous,
            webhook_id: self.webhook_id,
        })))
    }
}
