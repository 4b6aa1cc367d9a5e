//! Startup sweep: baseline every currently protected record before webhooks arrive.

use sentinel_types::{CachePatch, ClientError, Label, RecordClient, StateCache};
use std::collections::HashSet;

/// Counts from one pre-seeding sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub scanned: usize,
    /// Records with no prior entry.
    pub seeded: usize,
    /// Records whose live values drifted while the process was offline.
    pub refreshed: usize,
    pub unchanged: usize,
}

/// Resolve protected label names to labels; names with no match are logged and skipped.
pub async fn resolve_protected_labels<'a>(
    client: &dyn RecordClient,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Label>, ClientError> {
    let mut labels = Vec::new();
    for name in names {
        match client.resolve_label_by_name(name).await? {
            Some(label) => {
                tracing::info!(name, label_id = %label.id, "protected label resolved");
                labels.push(label);
            }
            None => tracing::warn!(name, "protected label not found in tracker"),
        }
    }
    Ok(labels)
}

/// Write the live SLA/priority of every record carrying a protected label into the cache
/// when no entry exists or the entry differs. The cache is written once, after the scan.
pub async fn seed_from_records(
    client: &dyn RecordClient,
    cache: &dyn StateCache,
    labels: &[Label],
) -> Result<SeedReport, ClientError> {
    let mut report = SeedReport::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pending: Vec<(String, CachePatch)> = Vec::new();
    for label in labels {
        let records = client.list_records_with_label(&label.id).await?;
        tracing::debug!(label = %label.name, count = records.len(), "listing protected records");
        for record in records {
            if !seen.insert(record.id.clone()) {
                continue;
            }
            report.scanned += 1;
            let patch = CachePatch::from_record(&record);
            match cache.get(&record.id).await {
                None => report.seeded += 1,
                Some(entry) if patch.differs_from(&entry) => {
                    tracing::info!(
                        record_id = %record.id,
                        identifier = %record.identifier,
                        "record changed while offline; refreshing baseline"
                    );
                    report.refreshed += 1;
                }
                Some(_) => {
                    report.unchanged += 1;
                    continue;
                }
            }
            pending.push((record.id, patch));
        }
    }
    cache.put_many(pending).await;
    Ok(report)
}
