use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::document::DocumentStore;

use super::TransclusionResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct CacheKey {
    pub document: String,
    pub content_hash: u64,
    pub max_depth: usize,
}

#[derive(Debug, Clone)]
pub(super) struct CachedResolution {
    pub result: TransclusionResult,
    /// Every document looked up during resolution and its hash at the time;
    /// `None` records a miss.
    pub dependencies: Vec<(String, Option<u64>)>,
    /// Name set of the store when a missing target was matched against it
    pub names: Option<u64>,
}

/// Hash of every document name in the store, in store order.
pub(super) fn names_fingerprint(store: &dyn DocumentStore) -> u64 {
    let mut hasher = Xxh3::new();
    for name in store.names() {
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    hasher.digest()
}

impl CachedResolution {
    fn is_fresh(&self, store: &dyn DocumentStore) -> bool {
        let names_unchanged = self.names.map_or(true, |names| names == names_fingerprint(store));
        names_unchanged
            && self
                .dependencies
                .iter()
                .all(|(name, hash)| store.get(name).map(|d| d.content_hash) == *hash)
    }

    fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|(n, _)| n == name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub(super) struct ResolutionCache {
    entries: HashMap<CacheKey, CachedResolution>,
    hits: u64,
    misses: u64,
}

impl ResolutionCache {
    /// Returns a cached result if every document it depended on is unchanged.
    /// A stale entry is dropped.
    pub fn lookup(&mut self, key: &CacheKey, store: &dyn DocumentStore) -> Option<TransclusionResult> {
        let fresh = match self.entries.get(key) {
            Some(entry) => entry.is_fresh(store),
            None => {
                self.misses += 1;
                return None;
            }
        };

        if fresh {
            self.hits += 1;
            self.entries.get(key).map(|e| e.result.clone())
        } else {
            tracing::debug!("Dropping stale transclusion cache entry for {}", key.document);
            self.entries.remove(key);
            self.misses += 1;
            None
        }
    }

    /// Drops entries for the same document resolved from different content.
    pub fn evict_stale_roots(&mut self, key: &CacheKey) {
        self.entries
            .retain(|k, _| k.document != key.document || k.content_hash == key.content_hash);
    }

    pub fn insert(&mut self, key: CacheKey, entry: CachedResolution) {
        self.entries.insert(key, entry);
    }

    pub fn invalidate(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|k, entry| k.document != name && !entry.depends_on(name));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
