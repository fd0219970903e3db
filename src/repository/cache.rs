//! Metadata cache surface
//!
//! Repositories load parsed recipe metadata through an opaque key-value
//! surface: string maps keyed by the package's canonical name-version.
//! The on-disk format and the generator that fills misses live outside
//! the core; the in-memory implementation here is what the bundled
//! repositories and the test suite use.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Raw metadata for one package version: recipe variable name to value
pub type RawMetadata = BTreeMap<String, String>;

/// An opaque key-value store of raw metadata
pub trait MetadataCache: Send + Sync {
    fn get(&self, key: &str) -> Option<RawMetadata>;
    fn put(&self, key: &str, value: RawMetadata);
    /// Drop everything, e.g. after a sync.
    fn clear(&self);
}

/// In-memory metadata cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, RawMetadata>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataCache for MemoryCache {
    fn get(&self, key: &str) -> Option<RawMetadata> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: RawMetadata) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        assert!(cache.get("app-a/x-1.0").is_none());

        let mut raw = RawMetadata::new();
        raw.insert("SLOT".to_string(), "0".to_string());
        cache.put("app-a/x-1.0", raw.clone());
        assert_eq!(cache.get("app-a/x-1.0"), Some(raw));

        cache.clear();
        assert!(cache.get("app-a/x-1.0").is_none());
    }
}
