//! Dedup cache for repeated identical compile attempts.
//!
//! A confused role re-submitting the same request within the window gets
//! the cached result instead of re-spending build time. The cache is owned
//! by the compiler service; nothing else writes to it.

use crate::compiler::BuildResult;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    result: BuildResult,
    produced_at: Instant,
}

/// TTL-bounded cache keyed by build signature.
pub struct BuildCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl BuildCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached result for `signature` if it is still within the
    /// dedup window. Expired entries are dropped.
    pub fn get(&mut self, signature: &str) -> Option<BuildResult> {
        match self.entries.get(signature) {
            Some(entry) if entry.produced_at.elapsed() <= self.ttl => Some(entry.result.clone()),
            Some(_) => {
                self.entries.remove(signature);
                None
            }
            None => None,
        }
    }

    /// Stores a result, superseding any previous entry for the signature.
    pub fn insert(&mut self, signature: String, result: BuildResult) {
        self.entries.insert(
            signature,
            CacheEntry {
                result,
                produced_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AppModel;

    fn result() -> BuildResult {
        BuildResult {
            success: true,
            binary_path: None,
            artifact_dir: None,
            app_model: AppModel::Console,
            diagnostics: vec![],
            primary_error: None,
        }
    }

    #[test]
    fn test_hit_within_window() {
        let mut cache = BuildCache::new(Duration::from_secs(15));
        cache.insert("sig".to_string(), result());
        assert!(cache.get("sig").is_some());
    }

    #[test]
    fn test_miss_on_unknown_signature() {
        let mut cache = BuildCache::new(Duration::from_secs(15));
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let mut cache = BuildCache::new(Duration::ZERO);
        cache.insert("sig".to_string(), result());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("sig").is_none());
        // And it is really gone, not just filtered
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn test_insert_supersedes() {
        let mut cache = BuildCache::new(Duration::from_secs(15));
        cache.insert("sig".to_string(), result());
        let mut newer = result();
        newer.success = false;
        cache.insert("sig".to_string(), newer);
        assert!(!cache.get("sig").unwrap().success);
    }
}
