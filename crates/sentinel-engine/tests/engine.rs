//! Decision pipeline against the in-memory tracker, a file-backed cache and an in-memory audit sink.

use sentinel_client::{InMemoryRecordClient, TrackerNotifier};
use sentinel_engine::{
    AgentIdentity, AllowList, EnforcementConfig, EnforcementEngine, EnforcementMode, SkipReason,
};
use sentinel_store::{InMemoryAuditSink, JsonFileStateCache};
use sentinel_types::{
    Actor, AuditAction, AuditListOptions, AuditSink, CachePatch, ChangeEvent, ClientError,
    Enforcer, EventKind, Label, ProtectedField, Record, RecordSnapshot, SlaTriplet, StateCache,
};
use std::sync::Arc;
use std::time::Duration;

const T0: &str = "2024-05-01T00:00:00.000Z";
const T1: &str = "2024-05-08T00:00:00.000Z";
const T2: &str = "2024-05-03T00:00:00.000Z";

fn label(id: &str, name: &str, parent: Option<&str>) -> Label {
    Label {
        id: id.to_string(),
        name: name.to_string(),
        parent_id: parent.map(str::to_string),
    }
}

fn frontend() -> Label {
    label("l-a", "Frontend", None)
}

fn vuln() -> Label {
    label("l-vuln", "Vulnerability", Some("g-sec"))
}

/// Shares the `g-sec` group with `vuln()`.
fn critical() -> Label {
    label("l-crit", "Critical", Some("g-sec"))
}

fn bug() -> Label {
    label("l-bug", "Bug", None)
}

fn record(labels: Vec<Label>, priority: u8, breaches_at: &str) -> Record {
    Record {
        id: "i1".to_string(),
        identifier: "SEC-1".to_string(),
        title: "Leaky bucket".to_string(),
        url: None,
        labels,
        priority,
        sla_type: Some("all".to_string()),
        sla_started_at: Some(T0.to_string()),
        sla_breaches_at: Some(breaches_at.to_string()),
        sla_high_risk_at: None,
        sla_medium_risk_at: None,
    }
}

fn dev() -> Actor {
    Actor {
        id: "u-dev".to_string(),
        email: Some("dev@example.com".to_string()),
        name: "Dev".to_string(),
        is_integration: false,
    }
}

fn event(actor: Actor, current: RecordSnapshot, previous: Option<RecordSnapshot>) -> ChangeEvent {
    ChangeEvent {
        record_id: "i1".to_string(),
        kind: EventKind::FieldUpdate,
        actor,
        current,
        previous,
        webhook_id: Some("wh-1".to_string()),
    }
}

fn label_ids(labels: &[Label]) -> Vec<String> {
    labels.iter().map(|l| l.id.clone()).collect()
}

/// Label removal: previous `{A, Vulnerability}`, current `{A}`.
fn removal_event(actor: Actor) -> ChangeEvent {
    let mut current = record(vec![frontend()], 3, T1).to_snapshot();
    current.label_ids = Some(label_ids(&[frontend()]));
    let previous = RecordSnapshot {
        label_ids: Some(label_ids(&[frontend(), vuln()])),
        ..Default::default()
    };
    event(actor, current, Some(previous))
}

struct Harness {
    client: InMemoryRecordClient,
    cache: Arc<JsonFileStateCache>,
    audit: Arc<InMemoryAuditSink>,
    engine: EnforcementEngine,
    _dir: tempfile::TempDir,
}

fn config() -> EnforcementConfig {
    EnforcementConfig::new(["Vulnerability"])
        .with_agent(AgentIdentity {
            id: Some("sentinel-bot".to_string()),
            email: Some("sentinel@example.com".to_string()),
            name: Some("Sentinel".to_string()),
        })
        .with_allow_list(AllowList::new(["u-lead"], ["lead@example.com"]))
        .with_revert_delay(Duration::from_millis(100))
}

async fn harness_with(client: InMemoryRecordClient, config: EnforcementConfig) -> Harness {
    for l in [frontend(), vuln(), critical(), bug()] {
        client.insert_label(l);
    }
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(JsonFileStateCache::load(dir.path().join("cache.json")).await);
    let audit = Arc::new(InMemoryAuditSink::new());
    let notifier = Arc::new(TrackerNotifier::new(Arc::new(client.clone()), None));
    let engine = EnforcementEngine::new(
        config,
        Arc::new(client.clone()),
        cache.clone(),
        notifier,
        audit.clone(),
    );
    Harness {
        client,
        cache,
        audit,
        engine,
        _dir: dir,
    }
}

async fn harness() -> Harness {
    harness_with(InMemoryRecordClient::new(), config()).await
}

async fn wait_for_comments(client: &InMemoryRecordClient, n: usize) -> Vec<(String, String)> {
    for _ in 0..50 {
        let comments = client.comments();
        if comments.len() >= n {
            return comments;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client.comments()
}

async fn audit_actions(audit: &InMemoryAuditSink) -> Vec<AuditAction> {
    audit
        .list(&AuditListOptions::default())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect()
}

#[tokio::test]
async fn own_writes_are_ignored() {
    let h = harness().await;
    h.client.insert_record(record(vec![frontend()], 3, T1));

    let by_id = Actor {
        id: "sentinel-bot".to_string(),
        email: None,
        name: String::new(),
        is_integration: false,
    };
    let by_email = Actor {
        id: "other".to_string(),
        email: Some("SENTINEL@example.com".to_string()),
        name: String::new(),
        is_integration: false,
    };
    for actor in [by_id, by_email] {
        let result = h.engine.enforce(&removal_event(actor)).await.unwrap();
        assert!(!result.enforced());
        assert_eq!(result.reason(), "self");
    }
    assert!(h.client.updates().is_empty());
    assert_eq!(h.client.label_lookups(), 0);
    assert!(h.cache.get("i1").await.is_none());
}

#[tokio::test]
async fn unchanged_protected_record_refreshes_cache() {
    let h = harness().await;
    let current = record(vec![frontend(), vuln()], 3, T1).to_snapshot();
    let previous = RecordSnapshot {
        priority: Some(3),
        ..Default::default()
    };

    let result = h
        .engine
        .enforce(&event(dev(), current, Some(previous)))
        .await
        .unwrap();
    assert_eq!(result.skip_reason(), Some(SkipReason::NoRelevantChanges));
    let entry = h.cache.get("i1").await.unwrap();
    assert_eq!(entry.priority, Some(3));
    assert_eq!(entry.sla_breaches_at, Some(Some(T1.to_string())));
    assert!(h.client.updates().is_empty());
}

#[tokio::test]
async fn unprotected_record_is_left_alone() {
    let h = harness().await;
    let current = record(vec![frontend()], 1, T1).to_snapshot();
    let previous = RecordSnapshot {
        priority: Some(3),
        ..Default::default()
    };

    let result = h
        .engine
        .enforce(&event(dev(), current, Some(previous)))
        .await
        .unwrap();
    assert_eq!(result.reason(), "no protected label");
    assert!(h.cache.get("i1").await.is_none());
    assert!(h.audit.list(&AuditListOptions::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn adding_protected_label_is_never_a_violation() {
    let h = harness().await;
    let current = record(vec![frontend(), vuln()], 3, T1).to_snapshot();
    let previous = RecordSnapshot {
        label_ids: Some(label_ids(&[frontend()])),
        ..Default::default()
    };

    let result = h
        .engine
        .enforce(&event(dev(), current, Some(previous)))
        .await
        .unwrap();
    assert!(!result.enforced());
    assert_eq!(result.skip_reason(), Some(SkipReason::ProtectedLabelAdded));
    assert!(h.client.updates().is_empty());
    assert_eq!(h.cache.get("i1").await.unwrap().priority, Some(3));
}

#[tokio::test]
async fn protected_label_removal_is_reverted() {
    let h = harness().await;
    h.client.insert_record(record(vec![frontend()], 3, T1));

    let result = h.engine.enforce(&removal_event(dev())).await.unwrap();
    assert!(result.enforced());
    assert_eq!(result.changes().len(), 1);
    assert_eq!(result.changes()[0].field, ProtectedField::Labels);
    assert_eq!(
        result.changes()[0].description,
        "Removed protected label(s): Vulnerability"
    );

    let restored = h.client.record("i1").unwrap();
    assert_eq!(label_ids(&restored.labels), vec!["l-a", "l-vuln"]);
    let updates = h.client.updates();
    assert_eq!(updates.len(), 1);
    assert!(!updates[0].1.touches_sla());

    let comments = wait_for_comments(&h.client, 1).await;
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains("Restored label(s): Vulnerability"));
    assert_eq!(audit_actions(&h.audit).await, vec![AuditAction::Reverted]);
}

#[tokio::test]
async fn same_group_swap_restores_the_previous_label_set() {
    let h = harness().await;
    h.client.insert_record(record(vec![frontend(), critical()], 3, T1));
    let current = RecordSnapshot {
        id: Some("i1".to_string()),
        label_ids: Some(label_ids(&[frontend(), critical()])),
        ..Default::default()
    };
    let previous = RecordSnapshot {
        label_ids: Some(label_ids(&[frontend(), vuln()])),
        ..Default::default()
    };

    let result = h
        .engine
        .enforce(&event(dev(), current, Some(previous)))
        .await
        .unwrap();
    assert!(result.enforced());
    assert_eq!(result.changes().len(), 1);
    assert_eq!(
        result.changes()[0].description,
        "Removed protected label(s): Vulnerability"
    );

    let updates = h.client.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].1.label_ids,
        Some(vec!["l-a".to_string(), "l-vuln".to_string()])
    );
    let restored = h.client.record("i1").unwrap();
    assert_eq!(label_ids(&restored.labels), vec!["l-a", "l-vuln"]);
    assert!(!restored.labels.iter().any(|l| l.id == "l-crit"));
}

#[tokio::test]
async fn allow_listed_actor_may_remove_protection() {
    let h = harness().await;
    h.client.insert_record(record(vec![frontend()], 3, T1));
    let lead = Actor {
        id: "u-someone".to_string(),
        email: Some("Lead@Example.com".to_string()),
        name: "Lead".to_string(),
        is_integration: false,
    };

    let result = h.engine.enforce(&removal_event(lead)).await.unwrap();
    assert!(!result.enforced());
    assert_eq!(result.reason(), "authorized");
    assert!(h.client.updates().is_empty());
    let entry = h.cache.get("i1").await.unwrap();
    assert_eq!(entry.priority, Some(3));
    assert_eq!(entry.sla_breaches_at, Some(Some(T1.to_string())));
    assert_eq!(audit_actions(&h.audit).await, vec![AuditAction::Authorized]);
}

#[tokio::test]
async fn priority_and_sla_are_restored_in_two_phases() {
    let automation = SlaTriplet {
        sla_type: Some("business".to_string()),
        sla_started_at: Some(T0.to_string()),
        sla_breaches_at: Some("2024-05-02T00:00:00.000Z".to_string()),
    };
    let client =
        InMemoryRecordClient::new().with_sla_automation(Duration::from_millis(20), automation);
    let h = harness_with(client, config()).await;

    // Baseline before the unauthorized change.
    h.cache
        .put(
            "i1",
            CachePatch::from_sla(
                &SlaTriplet {
                    sla_type: Some("all".to_string()),
                    sla_started_at: Some(T0.to_string()),
                    sla_breaches_at: Some(T1.to_string()),
                },
                Some(4),
            ),
        )
        .await;
    h.client.insert_record(record(vec![vuln()], 2, T2));

    let current = record(vec![vuln()], 2, T2).to_snapshot();
    let previous = RecordSnapshot {
        priority: Some(4),
        sla_breaches_at: Some(Some(T1.to_string())),
        ..Default::default()
    };
    let result = h
        .engine
        .enforce(&event(dev(), current, Some(previous)))
        .await
        .unwrap();
    assert!(result.enforced());
    let priority = result
        .changes()
        .iter()
        .find(|c| c.field == ProtectedField::Priority)
        .unwrap();
    assert_eq!(
        priority.description,
        "Changed priority from Low to High (SLA was recalculated as a result)"
    );

    let updates = h.client.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].1.priority, Some(4));
    assert!(!updates[0].1.touches_sla());
    assert_eq!(updates[1].1.priority, None);
    assert_eq!(updates[1].1.sla_breaches_at, Some(Some(T1.to_string())));
    assert_eq!(updates[1].1.sla_type, Some(Some("all".to_string())));

    tokio::time::sleep(Duration::from_millis(60)).await;
    let final_state = h.client.record("i1").unwrap();
    assert_eq!(final_state.priority, 4);
    assert_eq!(final_state.sla_type.as_deref(), Some("all"));
    assert_eq!(final_state.sla_breaches_at.as_deref(), Some(T1));

    let entry = h.cache.get("i1").await.unwrap();
    assert_eq!(entry.priority, Some(4));
    assert_eq!(entry.sla_breaches_at, Some(Some(T1.to_string())));
}

#[tokio::test]
async fn priority_without_sla_baseline_is_a_single_write() {
    let h = harness().await;
    h.client.insert_record(record(vec![vuln()], 1, T1));
    // Event carries neither labels nor SLA; the engine reads the record for labels.
    let current = RecordSnapshot {
        id: Some("i1".to_string()),
        priority: Some(1),
        ..Default::default()
    };
    let previous = RecordSnapshot {
        priority: Some(3),
        ..Default::default()
    };

    let result = h
        .engine
        .enforce(&event(dev(), current, Some(previous)))
        .await
        .unwrap();
    assert!(result.enforced());
    let updates = h.client.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.priority, Some(3));
    assert!(!updates[0].1.touches_sla());
    assert_eq!(h.client.record("i1").unwrap().priority, 3);
}

#[tokio::test]
async fn dry_run_never_writes() {
    let h = harness_with(
        InMemoryRecordClient::new(),
        config().with_mode(EnforcementMode::DryRun),
    )
    .await;
    h.client.insert_record(record(vec![frontend()], 3, T1));

    let result = h.engine.enforce(&removal_event(dev())).await.unwrap();
    assert!(!result.enforced());
    assert!(result.dry_run());
    assert_eq!(result.summary().dry_run, Some(true));
    assert!(h.client.updates().is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.client.comments().is_empty());
    assert_eq!(audit_actions(&h.audit).await, vec![AuditAction::DryRun]);
}

#[tokio::test]
async fn notify_only_comments_without_reverting() {
    let h = harness_with(
        InMemoryRecordClient::new(),
        config().with_mode(EnforcementMode::NotifyOnly),
    )
    .await;
    h.client.insert_record(record(vec![frontend()], 3, T1));

    let result = h.engine.enforce(&removal_event(dev())).await.unwrap();
    assert_eq!(result.skip_reason(), Some(SkipReason::NotifyOnly));
    assert!(h.client.updates().is_empty());
    let comments = wait_for_comments(&h.client, 1).await;
    assert!(comments[0].1.contains("would have been reverted"));
    assert_eq!(audit_actions(&h.audit).await, vec![AuditAction::NotifyOnly]);
}

#[tokio::test]
async fn failed_revert_propagates_without_audit() {
    let h = harness().await;
    h.client.insert_record(record(vec![frontend()], 3, T1));
    h.client.fail_next_update(ClientError::Status {
        status: 400,
        body: "invalid label".to_string(),
    });

    let err = h.engine.enforce(&removal_event(dev())).await.unwrap_err();
    assert!(err.to_string().contains("400"));
    assert_eq!(h.client.updates().len(), 1);
    assert!(h.audit.list(&AuditListOptions::default()).await.unwrap().is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.client.comments().is_empty());
}

#[tokio::test]
async fn sla_recomputation_is_checked_against_cache() {
    let h = harness().await;
    h.cache
        .put(
            "i1",
            CachePatch::from_sla(
                &SlaTriplet {
                    sla_type: Some("all".to_string()),
                    sla_started_at: Some(T0.to_string()),
                    sla_breaches_at: Some(T1.to_string()),
                },
                Some(3),
            ),
        )
        .await;
    h.client.insert_record(record(vec![vuln()], 3, T2));

    let mut sla_event = event(dev(), record(vec![vuln()], 3, T2).to_snapshot(), None);
    sla_event.kind = EventKind::SlaRecomputed;

    let result = h.engine.enforce(&sla_event).await.unwrap();
    assert!(result.enforced());
    assert_eq!(result.changes()[0].field, ProtectedField::SlaBreachesAt);
    let updates = h.client.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.priority, None);
    assert_eq!(h.client.record("i1").unwrap().sla_breaches_at.as_deref(), Some(T1));
}

#[tokio::test]
async fn sla_recomputation_without_baseline_seeds_cache() {
    let h = harness().await;
    let mut sla_event = event(dev(), record(vec![vuln()], 2, T2).to_snapshot(), None);
    sla_event.kind = EventKind::SlaRecomputed;

    let result = h.engine.enforce(&sla_event).await.unwrap();
    assert_eq!(result.skip_reason(), Some(SkipReason::NoRelevantChanges));
    assert_eq!(
        h.cache.get("i1").await.unwrap().sla_breaches_at,
        Some(Some(T2.to_string()))
    );
}

#[tokio::test]
async fn removed_records_are_skipped() {
    let h = harness().await;
    let mut removed = removal_event(dev());
    removed.kind = EventKind::RecordRemoved;
    let result = h.engine.enforce(&removed).await.unwrap();
    assert_eq!(result.reason(), "record removed");
    assert!(h.client.updates().is_empty());
}

#[tokio::test]
async fn each_label_is_looked_up_once_per_event() {
    let h = harness().await;
    // Ids only, no label objects: every id must go through the client.
    let current = RecordSnapshot {
        id: Some("i1".to_string()),
        label_ids: Some(label_ids(&[frontend(), vuln()])),
        ..Default::default()
    };
    let previous = RecordSnapshot {
        label_ids: Some(label_ids(&[frontend(), vuln(), bug()])),
        ..Default::default()
    };

    let result = h
        .engine
        .enforce(&event(dev(), current, Some(previous)))
        .await
        .unwrap();
    assert_eq!(result.skip_reason(), Some(SkipReason::NoRelevantChanges));
    assert_eq!(h.client.label_lookups(), 3);
}
