//! Protected-field sentinel: POST /webhooks/linear, GET /jobs/:job_id, GET /audit.

use sentinel_api::{config::Config, server, startup};
use sentinel_client::{LinearClient, RetryPolicy, SlackNotifier, TrackerNotifier};
use sentinel_store::JsonlAuditSink;
use sentinel_types::{AuditSink, Notifier, RecordClient};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let retry = RetryPolicy {
        max_retries: config.http_max_retries,
        ..RetryPolicy::default()
    };
    let client: Arc<dyn RecordClient> = Arc::new(LinearClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.http_timeout,
        retry,
    )?);
    let slack = match config.slack_webhook_url {
        Some(ref url) => Some(SlackNotifier::new(url.clone(), config.http_timeout)?),
        None => None,
    };
    let notifier: Arc<dyn Notifier> = Arc::new(TrackerNotifier::new(Arc::clone(&client), slack));
    let audit: Arc<dyn AuditSink> = Arc::new(JsonlAuditSink::new(&config.audit_path));

    let state = startup::bootstrap(&config, client, notifier, audit).await?;
    let app = server::router(state);

    tracing::info!("sentinel listening on {}", config.listen);
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
