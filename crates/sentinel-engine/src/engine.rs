//! The decision pipeline. Each guard is a return point; their order is the contract:
//! self-filter, protection membership, allowed addition, detection, authorization,
//! mode, revert.

use crate::config::{EnforcementConfig, EnforcementMode};
use crate::detect::{detect_changes, label_diff};
use crate::labels::LabelResolver;
use crate::render;
use crate::revert::RevertPlan;
use sentinel_types::{
    AuditAction, AuditEntry, AuditSink, CacheEntry, CachePatch, ChangeDetection, ChangeEvent,
    ClientError, EnforceError, EnforcementResult, Enforcer, EventKind, Notifier, Record,
    RecordClient, RecordSnapshot, SkipReason, StateCache,
};
use std::sync::Arc;

/// Enforcement engine over injected collaborators.
pub struct EnforcementEngine {
    config: EnforcementConfig,
    client: Arc<dyn RecordClient>,
    cache: Arc<dyn StateCache>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl EnforcementEngine {
    pub fn new(
        config: EnforcementConfig,
        client: Arc<dyn RecordClient>,
        cache: Arc<dyn StateCache>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            client,
            cache,
            notifier,
            audit,
        }
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    async fn run(&self, event: &ChangeEvent) -> Result<EnforcementResult, ClientError> {
        let record_id = event.record_id.as_str();

        if self.config.agent.matches(&event.actor) {
            tracing::debug!(record_id = %record_id, "ignoring own write");
            return Ok(EnforcementResult::skipped(SkipReason::SelfAction));
        }
        if event.kind == EventKind::RecordRemoved {
            return Ok(EnforcementResult::skipped(SkipReason::RecordRemoved));
        }

        let cached = self.cache.get(record_id).await;
        let mut resolver = LabelResolver::new(self.client.as_ref());

        let mut current = event.current.clone();
        if current.label_id_list().is_none() {
            let record = self.client.get_record(record_id).await?;
            fill_from_record(&mut current, &record);
        }
        if let Some(ref labels) = current.labels {
            resolver.seed(labels);
        }
        if let Some(labels) = event.previous.as_ref().and_then(|p| p.labels.as_ref()) {
            resolver.seed(labels);
        }
        let current_ids = current.label_id_list().unwrap_or_default();

        let previous = match event.kind {
            EventKind::SlaRecomputed => cached.as_ref().map(previous_from_cache),
            _ => event.previous.clone(),
        };
        let previous_ids = previous.as_ref().and_then(RecordSnapshot::label_id_list);

        let has_now = self.any_protected(&mut resolver, &current_ids).await?;
        let had_before = match previous_ids {
            Some(ref ids) => self.any_protected(&mut resolver, ids).await?,
            None if cached.is_some() => true,
            None => has_now,
        };
        if !has_now && !had_before {
            return Ok(EnforcementResult::skipped(SkipReason::NoProtectedLabel));
        }

        let labels_changed = previous_ids
            .as_ref()
            .map(|ids| {
                let (removed, added) = label_diff(ids, &current_ids);
                !removed.is_empty() || !added.is_empty()
            })
            .unwrap_or(false);
        if labels_changed && has_now && !had_before {
            tracing::info!(record_id = %record_id, "record became protected");
            self.refresh(record_id, CachePatch::from_snapshot(&current)).await;
            return Ok(EnforcementResult::skipped(SkipReason::ProtectedLabelAdded));
        }

        let changes = match previous {
            Some(ref previous) => {
                detect_changes(&self.config, &mut resolver, previous, &current).await?
            }
            None => Vec::new(),
        };
        if changes.is_empty() {
            self.refresh(record_id, CachePatch::from_snapshot(&current)).await;
            return Ok(EnforcementResult::skipped(SkipReason::NoRelevantChanges));
        }

        if self.config.allow_list.permits(&event.actor) {
            tracing::info!(
                record_id = %record_id,
                actor = %event.actor.id,
                changes = changes.len(),
                "authorized change accepted as new baseline"
            );
            self.refresh(record_id, CachePatch::from_snapshot(&current)).await;
            self.record_audit(event, &current, AuditAction::Authorized, &changes).await;
            return Ok(not_enforced(SkipReason::Authorized, changes));
        }

        let previous = previous.unwrap_or_default();
        let plan = RevertPlan::build(record_id, &changes, &previous, cached.as_ref());

        match self.config.mode {
            EnforcementMode::DryRun => {
                tracing::warn!(
                    record_id = %record_id,
                    actor = %event.actor.id,
                    update = ?plan.update,
                    "dry run: would revert unauthorized change"
                );
                self.refresh(record_id, CachePatch::from_snapshot(&current)).await;
                self.record_audit(event, &current, AuditAction::DryRun, &changes).await;
                return Ok(not_enforced(SkipReason::DryRun, changes));
            }
            EnforcementMode::NotifyOnly => {
                tracing::warn!(
                    record_id = %record_id,
                    actor = %event.actor.id,
                    "unauthorized change left in place (notify-only)"
                );
                self.notify(
                    record_id,
                    render::notice_comment(&event.actor, &changes, &plan),
                    render::chat_message(&display_id(event, &current), &event.actor, &changes, false),
                );
                self.refresh(record_id, CachePatch::from_snapshot(&current)).await;
                self.record_audit(event, &current, AuditAction::NotifyOnly, &changes).await;
                return Ok(not_enforced(SkipReason::NotifyOnly, changes));
            }
            EnforcementMode::Enforce => {}
        }

        if plan.is_empty() {
            tracing::warn!(record_id = %record_id, "violation detected but nothing can be restored");
            return Ok(not_enforced(SkipReason::NothingToRestore, changes));
        }

        if let Err(e) = self.execute(record_id, &plan).await {
            tracing::error!(record_id = %record_id, error = %e, "revert failed");
            return Err(e);
        }
        tracing::info!(
            record_id = %record_id,
            actor = %event.actor.id,
            two_phase = plan.is_two_phase(),
            "reverted unauthorized change"
        );

        let restored = plan.restored();
        if !restored.is_empty() {
            self.refresh(record_id, restored).await;
        }
        self.notify(
            record_id,
            render::revert_comment(&event.actor, &changes, &plan),
            render::chat_message(&display_id(event, &current), &event.actor, &changes, true),
        );
        self.record_audit(event, &current, AuditAction::Reverted, &changes).await;
        Ok(EnforcementResult::Enforced { changes })
    }

    async fn any_protected(
        &self,
        resolver: &mut LabelResolver<'_>,
        ids: &[String],
    ) -> Result<bool, ClientError> {
        let labels = resolver.resolve_all(ids).await?;
        Ok(labels.iter().any(|l| self.config.is_protected_name(&l.name)))
    }

    /// Priority first; then, once the tracker's SLA automation has had time to run, SLA last.
    async fn execute(&self, record_id: &str, plan: &RevertPlan) -> Result<(), ClientError> {
        if plan.is_two_phase() {
            let (priority, sla) = plan.update.clone().split_sla();
            self.client.update_record(record_id, &priority).await?;
            tokio::time::sleep(self.config.revert_delay).await;
            self.client.update_record(record_id, &sla).await?;
        } else {
            self.client.update_record(record_id, &plan.update).await?;
        }
        Ok(())
    }

    async fn refresh(&self, record_id: &str, patch: CachePatch) {
        if patch.is_empty() {
            return;
        }
        self.cache.put(record_id, patch).await;
    }

    fn notify(&self, record_id: &str, comment: String, chat: String) {
        let notifier = Arc::clone(&self.notifier);
        let record_id = record_id.to_string();
        tokio::spawn(async move {
            notifier.post_comment(&record_id, &comment).await;
            notifier.post_chat_message(&chat).await;
        });
    }

    async fn record_audit(
        &self,
        event: &ChangeEvent,
        current: &RecordSnapshot,
        action: AuditAction,
        changes: &[ChangeDetection],
    ) {
        let entry = AuditEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            record_id: event.record_id.clone(),
            record_identifier: current.identifier.clone(),
            actor_id: event.actor.id.clone(),
            actor_email: event.actor.email.clone(),
            actor_name: event.actor.name.clone(),
            action,
            changes: changes.to_vec(),
            webhook_id: event.webhook_id.clone(),
        };
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(record_id = %event.record_id, error = %e, "audit append failed");
        }
    }
}

#[async_trait::async_trait]
impl Enforcer for EnforcementEngine {
    async fn enforce(&self, event: &ChangeEvent) -> Result<EnforcementResult, EnforceError> {
        let result = self.run(event).await?;
        tracing::debug!(
            record_id = %event.record_id,
            enforced = result.enforced(),
            reason = result.reason(),
            "decision"
        );
        Ok(result)
    }
}

fn not_enforced(reason: SkipReason, changes: Vec<ChangeDetection>) -> EnforcementResult {
    EnforcementResult::NotEnforced { reason, changes }
}

fn display_id(event: &ChangeEvent, current: &RecordSnapshot) -> String {
    current
        .identifier
        .clone()
        .unwrap_or_else(|| event.record_id.clone())
}

/// Baseline SLA from the cache, for events that carry no previous state.
fn previous_from_cache(entry: &CacheEntry) -> RecordSnapshot {
    RecordSnapshot {
        sla_type: entry.sla_type.clone(),
        sla_started_at: entry.sla_started_at.clone(),
        sla_breaches_at: entry.sla_breaches_at.clone(),
        ..Default::default()
    }
}

/// Fills fields the event left out with the record's live values.
fn fill_from_record(snapshot: &mut RecordSnapshot, record: &Record) {
    let live = record.to_snapshot();
    snapshot.identifier = snapshot.identifier.take().or(live.identifier);
    snapshot.title = snapshot.title.take().or(live.title);
    snapshot.label_ids = snapshot.label_ids.take().or(live.label_ids);
    snapshot.labels = snapshot.labels.take().or(live.labels);
    snapshot.priority = snapshot.priority.or(live.priority);
    snapshot.sla_type = snapshot.sla_type.take().or(live.sla_type);
    snapshot.sla_started_at = snapshot.sla_started_at.take().or(live.sla_started_at);
    snapshot.sla_breaches_at = snapshot.sla_breaches_at.take().or(live.sla_breaches_at);
    snapshot.sla_high_risk_at = snapshot.sla_high_risk_at.take().or(live.sla_high_risk_at);
    snapshot.sla_medium_risk_at = snapshot.sla_medium_risk_at.take().or(live.sla_medium_risk_at);
}
