//! Best-effort notifications: tracker comments and Slack incoming-webhook messages.

use sentinel_types::{ClientError, Notifier, RecordClient};
use std::sync::Arc;
use std::time::Duration;

/// Posts plain-text messages to a Slack incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    pub async fn send(&self, text: &str) -> Result<(), ClientError> {
        let res = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Comments through the record client; chat through Slack when configured.
pub struct TrackerNotifier {
    records: Arc<dyn RecordClient>,
    slack: Option<SlackNotifier>,
}

impl TrackerNotifier {
    pub fn new(records: Arc<dyn RecordClient>, slack: Option<SlackNotifier>) -> Self {
        Self { records, slack }
    }
}

#[async_trait::async_trait]
impl Notifier for TrackerNotifier {
    async fn post_comment(&self, record_id: &str, body: &str) {
        if let Err(e) = self.records.create_comment(record_id, body).await {
            tracing::warn!(record_id, error = %e, "failed to post comment");
        }
    }

    async fn post_chat_message(&self, text: &str) {
        let Some(ref slack) = self.slack else {
            tracing::debug!("no chat webhook configured; dropping message");
            return;
        };
        if let Err(e) = slack.send(text).await {
            tracing::warn!(error = %e, "failed to post chat message");
        }
    }
}
