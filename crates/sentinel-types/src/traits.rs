//! Collaborator traits injected into the enforcement engine.

use crate::{
    Actor, AuditEntry, AuditListOptions, CacheEntry, CachePatch, ChangeEvent, EnforcementResult,
    Label, Record, RecordUpdate,
};
use async_trait::async_trait;

/// Typed access to the remote record store.
///
/// Implementations retry transient failures themselves; errors that reach the caller
/// are either permanent or retries were exhausted.
#[async_trait]
pub trait RecordClient: Send + Sync {
    /// Read one record with labels, priority, and SLA fields.
    async fn get_record(&self, id: &str) -> Result<Record, ClientError>;

    /// Apply a partial update.
    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), ClientError>;

    async fn resolve_label_by_id(&self, id: &str) -> Result<Label, ClientError>;

    /// Case-insensitive lookup; `Ok(None)` when no label has that name.
    async fn resolve_label_by_name(&self, name: &str) -> Result<Option<Label>, ClientError>;

    /// Every record currently carrying the label (all pages).
    async fn list_records_with_label(&self, label_id: &str) -> Result<Vec<Record>, ClientError>;

    async fn create_comment(&self, record_id: &str, body: &str) -> Result<(), ClientError>;

    /// The identity the client authenticates as.
    async fn viewer(&self) -> Result<Actor, ClientError>;
}

/// Durable map from record id to last-known-good protected values.
///
/// Persistence failures are handled inside the cache; callers always get the merged value.
#[async_trait]
pub trait StateCache: Send + Sync {
    async fn get(&self, record_id: &str) -> Option<CacheEntry>;

    /// Merge `patch` into the entry and persist before returning.
    async fn put(&self, record_id: &str, patch: CachePatch) -> CacheEntry;

    /// Merge several patches; persistent caches write once for the whole batch.
    async fn put_many(&self, patches: Vec<(String, CachePatch)>) {
        for (record_id, patch) in patches {
            self.put(&record_id, patch).await;
        }
    }
}

/// Human-facing notifications. Best effort: implementations log and swallow failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_comment(&self, record_id: &str, body: &str);

    async fn post_chat_message(&self, text: &str);
}

/// Append-only decision log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditSinkError>;

    /// Newest first, filtered and paginated.
    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditEntry>, AuditSinkError>;
}

/// Anything that can decide on a change event.
#[async_trait]
pub trait Enforcer: Send + Sync {
    async fn enforce(&self, event: &ChangeEvent) -> Result<EnforcementResult, EnforceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("GraphQL error: {message}")]
    GraphQl {
        message: String,
        code: Option<String>,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    /// Network failures, rate limits, and 5xx are worth retrying; 4xx and validation errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Status { status, .. } => *status == 429 || *status >= 500,
            ClientError::GraphQl { code, .. } => code.as_deref() == Some("RATELIMITED"),
            ClientError::NotFound(_) | ClientError::Decode(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditSinkError {
    #[error("invalid audit query: {0}")]
    InvalidQuery(String),
    #[error("audit sink error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EnforceError {
    #[error("record client: {0}")]
    Client(#[from] ClientError),
}
