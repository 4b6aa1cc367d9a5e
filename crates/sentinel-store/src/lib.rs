//! Local persistence: the durable state cache, its startup sweep, and the audit log.

mod audit;
mod file;
mod seed;

pub use audit::{InMemoryAuditSink, JsonlAuditSink};
pub use file::{JsonFileStateCache, CACHE_FORMAT_VERSION};
pub use seed::{resolve_protected_labels, seed_from_records, SeedReport};
pub use sentinel_types::{AuditSink, CacheEntry, CachePatch, StateCache};
