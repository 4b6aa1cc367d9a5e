use sentinel_types::{ClientError, Label, RecordClient};
use std::collections::HashMap;

/// Per-event id→label memo. Seeded from label objects carried in the event so that
/// each unknown id costs at most one lookup.
pub(crate) struct LabelResolver<'a> {
    client: &'a dyn RecordClient,
    known: HashMap<String, Label>,
}

impl<'a> LabelResolver<'a> {
    pub(crate) fn new(client: &'a dyn RecordClient) -> Self {
        Self {
            client,
            known: HashMap::new(),
        }
    }

    pub(crate) fn seed<'l>(&mut self, labels: impl IntoIterator<Item = &'l Label>) {
        for label in labels {
            self.known
                .entry(label.id.clone())
                .or_insert_with(|| label.clone());
        }
    }

    /// Label already seen in this event, without a lookup.
    pub(crate) fn cached(&self, id: &str) -> Option<&Label> {
        self.known.get(id)
    }

    pub(crate) async fn resolve(&mut self, id: &str) -> Result<Label, ClientError> {
        if let Some(label) = self.known.get(id) {
            return Ok(label.clone());
        }
        let label = self.client.resolve_label_by_id(id).await?;
        self.known.insert(id.to_string(), label.clone());
        Ok(label)
    }

    /// Resolves every id; deleted labels (not found) are dropped.
    pub(crate) async fn resolve_all(&mut self, ids: &[String]) -> Result<Vec<Label>, ClientError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.resolve(id).await {
                Ok(label) => out.push(label),
                Err(ClientError::NotFound(_)) => {
                    tracing::debug!(label_id = %id, "label no longer exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
