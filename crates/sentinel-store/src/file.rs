//! JSON-document state cache, rewritten on every put (once per batch for `put_many`).
//!
//! Layout: `{"version": 1, "entries": {"<record id>": {slaType, slaStartedAt, slaBreachesAt, priority, cachedAt}}}`.

use sentinel_types::{CacheEntry, CachePatch, StateCache};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

struct Inner {
    entries: BTreeMap<String, CacheEntry>,
    /// Set while the file lags behind memory; cleared by the next successful write.
    dirty: bool,
}

/// File-backed [`StateCache`]. Read and write failures are logged, never returned.
pub struct JsonFileStateCache {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JsonFileStateCache {
    /// Load the document at `path`; a missing or unreadable file starts an empty cache.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<CacheDocument>(&content) {
                Ok(doc) if doc.version == CACHE_FORMAT_VERSION => {
                    tracing::info!(path = %path.display(), entries = doc.entries.len(), "state cache loaded");
                    doc.entries
                }
                Ok(doc) => {
                    tracing::warn!(
                        path = %path.display(),
                        version = doc.version,
                        "unsupported state cache version; starting empty"
                    );
                    BTreeMap::new()
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "state cache unreadable; starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no state cache on disk; starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read state cache; starting empty");
                BTreeMap::new()
            }
        };
        Self {
            path,
            inner: Mutex::new(Inner {
                entries,
                dirty: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// True when the last write failed and the file is stale.
    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Write the whole document through a `.tmp` sibling so readers never see a torn file.
    async fn persist(&self, entries: &BTreeMap<String, CacheEntry>) -> std::io::Result<()> {
        let doc = serde_json::json!({
            "version": CACHE_FORMAT_VERSION,
            "entries": entries,
        });
        let data = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Persist after a merge; a failure leaves the cache dirty until the next write succeeds.
    async fn write_back(&self, inner: &mut Inner, what: &str) {
        match self.persist(&inner.entries).await {
            Ok(()) => {
                if inner.dirty {
                    tracing::info!(path = %self.path.display(), "state cache write recovered");
                }
                inner.dirty = false;
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    what,
                    error = %e,
                    "failed to persist state cache; will retry on next put"
                );
                inner.dirty = true;
            }
        }
    }
}

#[async_trait::async_trait]
impl StateCache for JsonFileStateCache {
    async fn get(&self, record_id: &str) -> Option<CacheEntry> {
        self.inner.lock().await.entries.get(record_id).cloned()
    }

    async fn put(&self, record_id: &str, patch: CachePatch) -> CacheEntry {
        let mut inner = self.inner.lock().await;
        let merged = merge(&mut inner.entries, record_id, patch);
        self.write_back(&mut inner, record_id).await;
        merged
    }

    async fn put_many(&self, patches: Vec<(String, CachePatch)>) {
        if patches.is_empty() {
            return;
        }
        let count = patches.len();
        let mut inner = self.inner.lock().await;
        for (record_id, patch) in patches {
            merge(&mut inner.entries, &record_id, patch);
        }
        self.write_back(&mut inner, &format!("{} records", count)).await;
    }
}

fn merge(entries: &mut BTreeMap<String, CacheEntry>, record_id: &str, patch: CachePatch) -> CacheEntry {
    let merged = patch.apply(entries.get(record_id).cloned(), chrono::Utc::now().to_rfc3339());
    entries.insert(record_id.to_string(), merged.clone());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priority(p: u8) -> CachePatch {
        CachePatch {
            priority: Some(p),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn put_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = JsonFileStateCache::load(&path).await;
        cache.put("i1", priority(2)).await;
        drop(cache);

        let reloaded = JsonFileStateCache::load(&path).await;
        assert_eq!(reloaded.get("i1").await.unwrap().priority, Some(2));
    }

    #[tokio::test]
    async fn put_merges_without_dropping_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileStateCache::load(dir.path().join("cache.json")).await;
        cache
            .put(
                "i1",
                CachePatch {
                    sla_type: Some(Some("all".into())),
                    sla_breaches_at: Some(Some("2024-05-08T00:00:00.000Z".into())),
                    ..Default::default()
                },
            )
            .await;
        let merged = cache.put("i1", priority(4)).await;
        assert_eq!(merged.sla_type, Some(Some("all".into())));
        assert_eq!(merged.priority, Some(4));
        assert_eq!(cache.get("i1").await.unwrap(), merged);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let cache = JsonFileStateCache::load(&path).await;
        assert!(cache.is_empty().await);
        cache.put("i1", priority(1)).await;
        assert!(!cache.is_dirty().await);
    }

    #[tokio::test]
    async fn failed_write_is_retried_on_next_put() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("state");
        let path = sub.join("cache.json");
        let cache = JsonFileStateCache::load(&path).await;

        cache.put("i1", priority(2)).await;
        assert!(cache.is_dirty().await);
        assert_eq!(cache.get("i1").await.unwrap().priority, Some(2));

        tokio::fs::create_dir_all(&sub).await.unwrap();
        cache.put("i2", priority(3)).await;
        assert!(!cache.is_dirty().await);

        let reloaded = JsonFileStateCache::load(&path).await;
        assert_eq!(reloaded.get("i1").await.unwrap().priority, Some(2));
        assert_eq!(reloaded.get("i2").await.unwrap().priority, Some(3));
    }

    #[tokio::test]
    async fn put_many_merges_and_persists_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = JsonFileStateCache::load(&path).await;
        cache
            .put(
                "i1",
                CachePatch {
                    sla_type: Some(Some("all".into())),
                    ..Default::default()
                },
            )
            .await;
        cache
            .put_many(vec![("i1".to_string(), priority(2)), ("i2".to_string(), priority(3))])
            .await;
        assert!(!cache.is_dirty().await);

        let reloaded = JsonFileStateCache::load(&path).await;
        let i1 = reloaded.get("i1").await.unwrap();
        assert_eq!(i1.sla_type, Some(Some("all".into())));
        assert_eq!(i1.priority, Some(2));
        assert_eq!(reloaded.get("i2").await.unwrap().priority, Some(3));
    }

    #[tokio::test]
    async fn document_layout_is_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = JsonFileStateCache::load(&path).await;
        cache.put("i1", priority(2)).await;
        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["entries"]["i1"]["priority"], 2);
        assert!(raw["entries"]["i1"]["cachedAt"].is_string());
    }
}
