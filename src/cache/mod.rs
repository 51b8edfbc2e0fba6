use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::synonyms::fold;
use crate::models::Entities;

pub mod response_cache;

pub use response_cache::ResponseCache;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of extraction results, keyed by the folded query text.
/// Extraction is pure, so the cached value never goes stale.
pub struct ExtractionCache {
    cache: Arc<RwLock<LruCache<String, Entities>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl ExtractionCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
            stats: Arc::new(RwLock::new(CacheStats::new())),
        }
    }

    pub async fn get(&self, query: &str) -> Option<Entities> {
        let key = fold(query);
        let found = self.cache.write().await.get(&key).cloned();
        let mut stats = self.stats.write().await;
        match found {
            Some(entities) => {
                stats.record_hit();
                Some(entities)
            }
            None => {
                stats.record_miss();
                None
            }
        }
    }

    pub async fn put(&self, query: &str, entities: Entities) {
        let key = fold(query);
        let mut cache = self.cache.write().await;
        cache.put(key, entities);
        self.stats.write().await.entries = cache.len();
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extraction_cache_hits_on_folded_key() {
        let cache = ExtractionCache::new(8);
        let entities = Entities {
            brand: Some("BMW".to_string()),
            ..Default::default()
        };
        cache.put("Красная БМВ", entities.clone()).await;

        // Case and ё/е differences collapse to the same key.
        assert_eq!(cache.get("красная бмв").await, Some(entities));
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn extraction_cache_evicts_least_recent() {
        let cache = ExtractionCache::new(1);
        cache.put("первый", Entities::default()).await;
        cache.put("второй", Entities::default()).await;
        assert!(cache.get("первый").await.is_none());
        assert!(cache.get("второй").await.is_some());
    }
}
