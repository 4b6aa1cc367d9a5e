//! Startup: validate protected labels, discover the agent identity, load and seed the cache,
//! then wire the engine behind the event queue.

use crate::config::Config;
use crate::server::AppState;
use sentinel_engine::{AgentIdentity, EnforcementEngine};
use sentinel_scheduler::InMemoryEventQueue;
use sentinel_store::{resolve_protected_labels, seed_from_records, JsonFileStateCache};
use sentinel_types::{AuditSink, ClientError, Label, Notifier, RecordClient};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("none of the protected labels exist in the tracker: {0:?}")]
    NoProtectedLabels(Vec<String>),
    #[error("record client: {0}")]
    Client(#[from] ClientError),
}

/// Resolve configured label names. Missing names are skipped; none at all is fatal.
pub async fn validate_protected_labels(
    client: &dyn RecordClient,
    names: &[String],
) -> Result<Vec<Label>, StartupError> {
    let labels = resolve_protected_labels(client, names.iter().map(String::as_str)).await?;
    if labels.is_empty() {
        return Err(StartupError::NoProtectedLabels(names.to_vec()));
    }
    Ok(labels)
}

/// The configured identity, or the API key's own user when none is configured.
pub async fn discover_agent(
    client: &dyn RecordClient,
    configured: &AgentIdentity,
) -> Result<AgentIdentity, ClientError> {
    if !configured.is_empty() {
        return Ok(configured.clone());
    }
    let me = client.viewer().await?;
    tracing::info!(agent_id = %me.id, agent_name = %me.name, "agent identity discovered");
    Ok(AgentIdentity {
        id: Some(me.id),
        email: me.email,
        name: (!me.name.is_empty()).then_some(me.name),
    })
}

/// Runs every startup step and returns the state the router serves.
pub async fn bootstrap(
    config: &Config,
    client: Arc<dyn RecordClient>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
) -> Result<Arc<AppState>, StartupError> {
    let labels = validate_protected_labels(client.as_ref(), &config.protected_labels).await?;
    let agent = discover_agent(client.as_ref(), &config.agent).await?;

    let cache = Arc::new(JsonFileStateCache::load(&config.cache_path).await);
    match seed_from_records(client.as_ref(), cache.as_ref(), &labels).await {
        Ok(report) => tracing::info!(
            scanned = report.scanned,
            seeded = report.seeded,
            refreshed = report.refreshed,
            unchanged = report.unchanged,
            "state cache pre-seeded"
        ),
        Err(e) => tracing::warn!(error = %e, "pre-seeding sweep failed; continuing with loaded cache"),
    }

    let enforcement = config.enforcement(agent);
    tracing::info!(
        mode = ?enforcement.mode,
        protected_labels = labels.len(),
        allow_list = enforcement.allow_list.len(),
        revert_delay_ms = enforcement.revert_delay.as_millis() as u64,
        "enforcement configured"
    );
    let engine = Arc::new(EnforcementEngine::new(
        enforcement,
        Arc::clone(&client),
        cache,
        Arc::clone(&notifier),
        Arc::clone(&audit),
    ));
    let queue = Arc::new(InMemoryEventQueue::new(engine, notifier));

    Ok(Arc::new(AppState {
        queue,
        audit_log: audit,
        webhook_max_age: config.webhook_max_age,
    }))
}
