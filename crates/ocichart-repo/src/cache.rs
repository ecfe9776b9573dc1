//! Process-wide chart cache
//!
//! Two maps behind one lock: content digest to record, logical path to
//! reference. Entries are only replaced, never evicted; size is bounded by
//! the upstream catalog.

use ocichart_core::{ChartRecord, ChartReference};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct CacheState {
    records: HashMap<String, ChartRecord>,
    references: HashMap<String, ChartReference>,
}

/// Digest- and path-keyed chart cache
#[derive(Debug, Default)]
pub struct CatalogCache {
    state: RwLock<CacheState>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_by_digest(&self, digest: &str) -> Option<ChartRecord> {
        self.read().records.get(digest).cloned()
    }

    pub fn contains_digest(&self, digest: &str) -> bool {
        self.read().records.contains_key(digest)
    }

    pub fn get_by_path(&self, path: &str) -> Option<ChartReference> {
        self.read().references.get(path).cloned()
    }

    pub fn put_record(&self, record: ChartRecord) {
        self.write().records.insert(record.digest.clone(), record);
    }

    pub fn put_reference(&self, path: impl Into<String>, reference: ChartReference) {
        self.write().references.insert(path.into(), reference);
    }

    /// Store a record and its reference in one critical section.
    ///
    /// If the record's path pointed at another digest, that digest's record
    /// is dropped.
    pub fn commit(&self, record: ChartRecord, reference: ChartReference) {
        let path = record.path();
        let mut guard = self.write();
        let state = &mut *guard;

        if let Some(previous) = state.references.get(&path) {
            if previous.digest != record.digest {
                let superseded = previous.digest.clone();
                tracing::debug!(path = %path, old = %superseded, new = %record.digest, "chart re-pointed");
                state.records.remove(&superseded);
            }
        }

        state.references.insert(path, reference);
        state.records.insert(record.digest.clone(), record);
    }

    /// Copy of every record, ordered by name then version string
    pub fn snapshot_records(&self) -> Vec<ChartRecord> {
        let mut records: Vec<_> = self.read().records.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(name: &str, version: &str, digest: &str) -> ChartRecord {
        ChartRecord::from_config(
            format!(r#"{{"name":"{}","version":"{}"}}"#, name, version).as_bytes(),
            digest,
        )
        .unwrap()
    }

    #[test]
    fn test_commit_and_lookup() {
        let cache = CatalogCache::new();
        assert!(cache.is_empty());

        cache.commit(
            record("demo", "1.0.0", "sha256:a"),
            ChartReference::new("acp/demo:1.0.0", "sha256:a"),
        );

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_by_digest("sha256:a").unwrap().name, "demo");
        assert_eq!(
            cache.get_by_path("demo-1.0.0.tgz").unwrap().coordinates,
            "acp/demo:1.0.0"
        );
        assert!(cache.get_by_path("demo-2.0.0.tgz").is_none());
    }

    #[test]
    fn test_commit_is_idempotent() {
        let cache = CatalogCache::new();
        for _ in 0..3 {
            cache.commit(
                record("demo", "1.0.0", "sha256:a"),
                ChartReference::new("acp/demo:1.0.0", "sha256:a"),
            );
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_repoint_drops_superseded_digest() {
        let cache = CatalogCache::new();
        cache.commit(
            record("demo", "1.0.0", "sha256:old"),
            ChartReference::new("acp/demo:1.0.0", "sha256:old"),
        );
        cache.commit(
            record("demo", "1.0.0", "sha256:new"),
            ChartReference::new("mirror/demo:1.0.0", "sha256:new"),
        );

        assert_eq!(cache.len(), 1);
        assert!(cache.get_by_digest("sha256:old").is_none());
        let reference = cache.get_by_path("demo-1.0.0.tgz").unwrap();
        assert_eq!(reference.coordinates, "mirror/demo:1.0.0");
        assert_eq!(reference.digest, "sha256:new");
    }

    #[test]
    fn test_put_record_and_reference() {
        let cache = CatalogCache::new();
        cache.put_record(record("a", "1.0.0", "sha256:1"));
        cache.put_reference("a-1.0.0.tgz", ChartReference::new("p/a:1.0.0", "sha256:1"));
        assert!(cache.contains_digest("sha256:1"));
        assert!(cache.get_by_path("a-1.0.0.tgz").is_some());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let cache = CatalogCache::new();
        cache.put_record(record("zeta", "1.0.0", "sha256:z"));
        cache.put_record(record("alpha", "2.0.0", "sha256:a2"));
        cache.put_record(record("alpha", "1.0.0", "sha256:a1"));

        let names: Vec<_> = cache
            .snapshot_records()
            .into_iter()
            .map(|r| format!("{}-{}", r.name, r.version))
            .collect();
        assert_eq!(names, vec!["alpha-1.0.0", "alpha-2.0.0", "zeta-1.0.0"]);
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = Arc::new(CatalogCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let digest = format!("sha256:{}", i);
                    cache.commit(
                        record("demo", &format!("{}.0.0", i), &digest),
                        ChartReference::new(format!("p/demo:{}.0.0", i), digest.clone()),
                    );
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let cache = Arc::new(CatalogCache::new());
        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write();
            panic!("poison the lock");
        })
        .join();

        cache.put_record(record("demo", "1.0.0", "sha256:a"));
        assert_eq!(cache.len(), 1);
    }
}
