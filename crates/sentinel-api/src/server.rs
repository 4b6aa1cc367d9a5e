//! Axum server and routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sentinel_scheduler::EventQueue;
use sentinel_types::{
    AuditEntry, AuditListOptions, AuditSink, AuditSinkError, BaseResponse, Job, Normalized,
    WebhookPayload,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub queue: Arc<dyn EventQueue>,
    pub audit_log: Arc<dyn AuditSink>,
    /// Deliveries older than this are rejected; `None` accepts any age.
    pub webhook_max_age: Option<Duration>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/linear", post(handle_webhook))
        .route("/jobs/:job_id", get(handle_job_status))
        .route("/audit", get(handle_audit_list))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// True when `timestamp_ms` is further than `max_age` from now, in either direction.
fn is_stale(timestamp_ms: i64, now_ms: i64, max_age: Duration) -> bool {
    let skew = now_ms.saturating_sub(timestamp_ms).unsigned_abs();
    skew > max_age.as_millis() as u64
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, Json<BaseResponse<Value>>) {
    if let (Some(max_age), Some(ts)) = (state.webhook_max_age, payload.webhook_timestamp) {
        if is_stale(ts, chrono::Utc::now().timestamp_millis(), max_age) {
            tracing::warn!(webhook_timestamp = ts, "rejecting stale webhook delivery");
            return (
                StatusCode::UNAUTHORIZED,
                Json(BaseResponse::error(401, "webhook timestamp outside allowed window")),
            );
        }
    }

    let webhook_id = payload.webhook_id.clone();
    let event = match payload.normalize() {
        Ok(Normalized::Event(event)) => event,
        Ok(Normalized::Ignored(reason)) => {
            tracing::debug!(webhook_id = ?webhook_id, reason, "webhook ignored");
            return (
                StatusCode::OK,
                Json(BaseResponse::ok("Ignored", json!({ "ignored": reason }))),
            );
        }
        Err(e) => {
            tracing::warn!(webhook_id = ?webhook_id, error = %e, "malformed webhook data");
            return (
                StatusCode::BAD_REQUEST,
                Json(BaseResponse::error(400, format!("malformed record data: {}", e))),
            );
        }
    };

    let record_id = event.record_id.clone();
    match state.queue.submit(*event).await {
        Ok(job_id) => {
            tracing::info!(job_id = %job_id, record_id = %record_id, "change event queued");
            (
                StatusCode::OK,
                Json(BaseResponse::ok("Event queued", json!({ "job_id": job_id }))),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(BaseResponse::error(500, e.to_string())),
        ),
    }
}

async fn handle_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<BaseResponse<Job>> {
    match state.queue.status(&job_id).await {
        Ok(Some(job)) => Json(BaseResponse::ok("Success", job)),
        Ok(None) => Json(BaseResponse::error(404, "Job not found")),
        Err(e) => Json(BaseResponse::error(500, e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

async fn handle_audit_list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AuditListQuery>,
) -> Json<BaseResponse<Vec<AuditEntry>>> {
    let opts = AuditListOptions {
        record_id: q.record_id,
        actor_id: q.actor_id,
        since: q.since,
        limit: q.limit,
        offset: q.offset,
    };
    match state.audit_log.list(&opts).await {
        Ok(entries) => Json(BaseResponse::ok("Success", entries)),
        Err(e @ AuditSinkError::InvalidQuery(_)) => Json(BaseResponse::error(400, e.to_string())),
        Err(e) => Json(BaseResponse::error(500, e.to_string())),
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
