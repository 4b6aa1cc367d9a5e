//! In-memory record store for tests: no network, records call history, and can
//! simulate the tracker's SLA automation.

use sentinel_types::{
    Actor, ClientError, Label, Record, RecordClient, RecordUpdate, SlaTriplet,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Recomputes SLA fields a short while after any priority write, like Linear's workflow automation.
#[derive(Debug, Clone)]
pub struct SlaAutomation {
    pub delay: Duration,
    pub recomputed: SlaTriplet,
}

#[derive(Default)]
struct MockState {
    records: HashMap<String, Record>,
    labels: HashMap<String, Label>,
    updates: Vec<(String, RecordUpdate)>,
    comments: Vec<(String, String)>,
    label_lookups: usize,
    failures: VecDeque<ClientError>,
}

/// Fake [`RecordClient`] holding records and labels in memory.
#[derive(Clone)]
pub struct InMemoryRecordClient {
    state: Arc<Mutex<MockState>>,
    viewer: Actor,
    automation: Option<SlaAutomation>,
}

impl InMemoryRecordClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            viewer: Actor {
                id: "sentinel-bot".to_string(),
                email: Some("sentinel@example.com".to_string()),
                name: "Sentinel".to_string(),
                is_integration: false,
            },
            automation: None,
        }
    }

    pub fn with_viewer(mut self, viewer: Actor) -> Self {
        self.viewer = viewer;
        self
    }

    pub fn with_sla_automation(mut self, delay: Duration, recomputed: SlaTriplet) -> Self {
        self.automation = Some(SlaAutomation { delay, recomputed });
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_label(&self, label: Label) {
        self.state().labels.insert(label.id.clone(), label);
    }

    pub fn insert_record(&self, record: Record) {
        self.state().records.insert(record.id.clone(), record);
    }

    pub fn record(&self, id: &str) -> Option<Record> {
        self.state().records.get(id).cloned()
    }

    /// Every update call in order, including failed ones.
    pub fn updates(&self) -> Vec<(String, RecordUpdate)> {
        self.state().updates.clone()
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.state().comments.clone()
    }

    /// Number of `resolve_label_by_id` calls so far.
    pub fn label_lookups(&self) -> usize {
        self.state().label_lookups
    }

    /// Make the next `update_record` call fail with `err`.
    pub fn fail_next_update(&self, err: ClientError) {
        self.state().failures.push_back(err);
    }

    fn apply(state: &mut MockState, id: &str, update: &RecordUpdate) -> Result<(), ClientError> {
        let labels: Option<Vec<Label>> = update.label_ids.as_ref().map(|ids| {
            ids.iter()
                .map(|lid| {
                    state.labels.get(lid).cloned().unwrap_or_else(|| Label {
                        id: lid.clone(),
                        name: lid.clone(),
                        parent_id: None,
                    })
                })
                .collect()
        });
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| ClientError::NotFound(format!("issue {}", id)))?;
        if let Some(labels) = labels {
            record.labels = labels;
        }
        if let Some(p) = update.priority {
            record.priority = p;
        }
        if let Some(ref v) = update.sla_type {
            record.sla_type = v.clone();
        }
        if let Some(ref v) = update.sla_started_at {
            record.sla_started_at = v.clone();
        }
        if let Some(ref v) = update.sla_breaches_at {
            record.sla_breaches_at = v.clone();
        }
        Ok(())
    }
}

impl Default for InMemoryRecordClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordClient for InMemoryRecordClient {
    async fn get_record(&self, id: &str) -> Result<Record, ClientError> {
        self.state()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("issue {}", id)))
    }

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), ClientError> {
        {
            let mut state = self.state();
            state.updates.push((id.to_string(), update.clone()));
            if let Some(err) = state.failures.pop_front() {
                return Err(err);
            }
            Self::apply(&mut state, id, update)?;
        }
        if let (Some(auto), Some(_)) = (self.automation.clone(), update.priority) {
            let state = Arc::clone(&self.state);
            let id = id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(auto.delay).await;
                let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(record) = guard.records.get_mut(&id) {
                    record.sla_type = auto.recomputed.sla_type.clone();
                    record.sla_started_at = auto.recomputed.sla_started_at.clone();
                    record.sla_breaches_at = auto.recomputed.sla_breaches_at.clone();
                }
            });
        }
        Ok(())
    }

    async fn resolve_label_by_id(&self, id: &str) -> Result<Label, ClientError> {
        let mut state = self.state();
        state.label_lookups += 1;
        state
            .labels
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("label {}", id)))
    }

    async fn resolve_label_by_name(&self, name: &str) -> Result<Option<Label>, ClientError> {
        let state = self.state();
        let mut found: Vec<&Label> = state
            .labels
            .values()
            .filter(|l| l.name.eq_ignore_ascii_case(name))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found.first().map(|l| (*l).clone()))
    }

    async fn list_records_with_label(&self, label_id: &str) -> Result<Vec<Record>, ClientError> {
        let state = self.state();
        let mut out: Vec<Record> = state
            .records
            .values()
            .filter(|r| r.labels.iter().any(|l| l.id == label_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn create_comment(&self, record_id: &str, body: &str) -> Result<(), ClientError> {
        self.state()
            .comments
            .push((record_id.to_string(), body.to_string()));
        Ok(())
    }

    async fn viewer(&self) -> Result<Actor, ClientError> {
        Ok(self.viewer.clone())
    }
}
