//! Audit sinks: in-memory (process lifetime) and newline-delimited JSON file.
//!
//! Both answer `list` through [`AuditQuery`], which compares timestamps as instants:
//! `Z` and `+00:00` stamps of the same moment are equal, and other offsets order correctly.

use chrono::{DateTime, FixedOffset};
use sentinel_types::{AuditEntry, AuditListOptions, AuditSink, AuditSinkError};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Validated list options.
struct AuditQuery<'a> {
    record_id: Option<&'a str>,
    actor_id: Option<&'a str>,
    since: Option<DateTime<FixedOffset>>,
    offset: usize,
    limit: usize,
}

impl<'a> AuditQuery<'a> {
    fn parse(opts: &'a AuditListOptions) -> Result<Self, AuditSinkError> {
        let since = match opts.since.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(DateTime::parse_from_rfc3339(raw).map_err(|e| {
                AuditSinkError::InvalidQuery(format!("since {:?} is not RFC 3339: {}", raw, e))
            })?),
            _ => None,
        };
        Ok(Self {
            record_id: opts.record_id.as_deref(),
            actor_id: opts.actor_id.as_deref(),
            since,
            offset: opts.offset.unwrap_or(0) as usize,
            limit: opts.limit.map_or(DEFAULT_PAGE_SIZE, |l| l as usize),
        })
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if self.record_id.is_some_and(|id| id != entry.record_id) {
            return false;
        }
        if self.actor_id.is_some_and(|id| id != entry.actor_id) {
            return false;
        }
        let Some(since) = self.since else {
            return true;
        };
        match DateTime::parse_from_rfc3339(&entry.timestamp) {
            Ok(at) => at >= since,
            Err(e) => {
                tracing::debug!(
                    entry_id = %entry.entry_id,
                    timestamp = %entry.timestamp,
                    error = %e,
                    "audit entry timestamp unparsable; excluded from since filter"
                );
                false
            }
        }
    }

    /// `entries` in append order; the page comes back newest first.
    fn page<'e, I>(&self, entries: I) -> Vec<AuditEntry>
    where
        I: DoubleEndedIterator<Item = &'e AuditEntry>,
    {
        entries
            .rev()
            .filter(|e| self.matches(e))
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}

/// Keeps entries for the life of the process.
#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditSinkError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditEntry>, AuditSinkError> {
        let query = AuditQuery::parse(opts)?;
        let entries = self.entries.read().await;
        Ok(query.page(entries.iter()))
    }
}

/// One JSON object per line, appended; survives restarts.
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<AuditEntry>, AuditSinkError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuditSinkError::Other(e.to_string())),
        };
        let mut entries = Vec::new();
        let mut malformed = 0usize;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(_) => malformed += 1,
            }
        }
        if malformed > 0 {
            tracing::warn!(path = %self.path.display(), malformed, "skipped malformed audit lines");
        }
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditSinkError> {
        let mut line = serde_json::to_vec(&entry).map_err(|e| AuditSinkError::Other(e.to_string()))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditSinkError::Other(e.to_string()))?;
        file.write_all(&line)
            .await
            .map_err(|e| AuditSinkError::Other(e.to_string()))
    }

    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditEntry>, AuditSinkError> {
        let query = AuditQuery::parse(opts)?;
        let entries = self.read_all().await?;
        Ok(query.page(entries.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::AuditAction;

    fn entry_at(n: u32, timestamp: &str, record_id: &str, actor_id: &str) -> AuditEntry {
        AuditEntry {
            entry_id: format!("e{}", n),
            timestamp: timestamp.to_string(),
            record_id: record_id.to_string(),
            record_identifier: None,
            actor_id: actor_id.to_string(),
            actor_email: None,
            actor_name: "Ada".to_string(),
            action: AuditAction::Reverted,
            changes: Vec::new(),
            webhook_id: None,
        }
    }

    fn entry(n: u32, record_id: &str, actor_id: &str) -> AuditEntry {
        entry_at(n, &format!("2024-05-0{}T00:00:00+00:00", n), record_id, actor_id)
    }

    fn since(raw: &str) -> AuditListOptions {
        AuditListOptions {
            since: Some(raw.to_string()),
            ..Default::default()
        }
    }

    fn ids(entries: &[AuditEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.entry_id.as_str()).collect()
    }

    #[tokio::test]
    async fn jsonl_appends_and_lists_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("audit.jsonl"));
        for (n, rid) in [(1, "i1"), (2, "i2"), (3, "i1")] {
            sink.append(entry(n, rid, "u1")).await.unwrap();
        }
        let all = sink.list(&AuditListOptions::default()).await.unwrap();
        assert_eq!(ids(&all), vec!["e3", "e2", "e1"]);

        let raw = tokio::fs::read_to_string(sink.path()).await.unwrap();
        assert_eq!(raw.lines().count(), 3);
    }

    #[tokio::test]
    async fn jsonl_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("audit.jsonl"));
        sink.append(entry(1, "i1", "u1")).await.unwrap();
        let mut raw = tokio::fs::read_to_string(sink.path()).await.unwrap();
        raw.push_str("{ truncated\n");
        tokio::fs::write(sink.path(), raw).await.unwrap();
        sink.append(entry(2, "i1", "u1")).await.unwrap();

        let all = sink.list(&AuditListOptions::default()).await.unwrap();
        assert_eq!(ids(&all), vec!["e2", "e1"]);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let sink = InMemoryAuditSink::new();
        for (n, rid, aid) in [(1, "i1", "u1"), (2, "i1", "u2"), (3, "i2", "u1"), (4, "i1", "u1")] {
            sink.append(entry(n, rid, aid)).await.unwrap();
        }
        let opts = AuditListOptions {
            record_id: Some("i1".into()),
            actor_id: Some("u1".into()),
            ..Default::default()
        };
        assert_eq!(ids(&sink.list(&opts).await.unwrap()), vec!["e4", "e1"]);

        let opts = AuditListOptions {
            limit: Some(1),
            offset: Some(1),
            ..since("2024-05-02T00:00:00+00:00")
        };
        assert_eq!(ids(&sink.list(&opts).await.unwrap()), vec!["e3"]);
    }

    #[tokio::test]
    async fn since_compares_instants_not_text() {
        let sink = InMemoryAuditSink::new();
        sink.append(entry_at(1, "2026-10-19T12:03:57.296828842+00:00", "i1", "u1"))
            .await
            .unwrap();
        // 01:00Z, written with a +02:00 offset.
        sink.append(entry_at(2, "2024-05-02T03:00:00+02:00", "i1", "u1"))
            .await
            .unwrap();
        sink.append(entry_at(3, "2024-05-02T02:30:00Z", "i1", "u1"))
            .await
            .unwrap();

        let same_instant = sink.list(&since("2026-10-19T12:03:57.296828842Z")).await.unwrap();
        assert_eq!(ids(&same_instant), vec!["e1"]);

        let after_two = sink.list(&since("2024-05-02T02:00:00Z")).await.unwrap();
        assert_eq!(ids(&after_two), vec!["e3", "e1"]);

        let in_other_offset = sink.list(&since("2024-05-02T02:00:00+01:00")).await.unwrap();
        assert_eq!(ids(&in_other_offset), vec!["e3", "e2", "e1"]);
    }

    #[tokio::test]
    async fn unparsable_since_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonlAuditSink::new(dir.path().join("audit.jsonl"));
        let memory = InMemoryAuditSink::new();
        for sink in [&file as &dyn AuditSink, &memory as &dyn AuditSink] {
            let err = sink.list(&since("yesterday")).await.unwrap_err();
            assert!(matches!(err, AuditSinkError::InvalidQuery(_)));
        }
    }

    #[tokio::test]
    async fn missing_file_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("none.jsonl"));
        assert!(sink.list(&AuditListOptions::default()).await.unwrap().is_empty());
    }
}
