use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::cache::CacheStats;
use crate::core::synonyms::fold;
use crate::models::{Entities, Response};

/// TTL cache of fully assembled responses.
///
/// Concurrent identical queries collapse onto one computation: the entry API
/// runs the init future once and hands the value to every waiter.
pub struct ResponseCache {
    cache: Cache<String, Arc<Response>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl ResponseCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self {
            cache,
            stats: Arc::new(RwLock::new(CacheStats::new())),
        }
    }

    /// Cache key: SHA-256 over the folded query, the paging fields and the
    /// caller hints, since all of them change the visible result.
    pub fn cache_key(
        query: &str,
        offset: usize,
        limit: usize,
        show_cars: bool,
        hints: Option<&Entities>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fold(query).as_bytes());
        hasher.update(offset.to_le_bytes());
        hasher.update(limit.to_le_bytes());
        hasher.update([show_cars as u8]);
        if let Some(hints) = hints {
            hasher.update(serde_json::to_vec(hints).unwrap_or_default());
        }
        format!("{:x}", hasher.finalize())
    }

    pub async fn get_or_compute<F>(&self, key: String, init: F) -> Arc<Response>
    where
        F: Future<Output = Arc<Response>>,
    {
        let entry = self.cache.entry(key).or_insert_with(init).await;
        {
            let mut stats = self.stats.write().await;
            if entry.is_fresh() {
                stats.record_miss();
            } else {
                stats.record_hit();
            }
            stats.entries = self.cache.entry_count() as usize;
        }
        entry.into_value()
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseType;

    fn response(message: &str) -> Arc<Response> {
        Arc::new(Response {
            response_type: ResponseType::CarList,
            message: message.to_string(),
            cars: Vec::new(),
            entities: Entities::default(),
            total_count: 0,
            has_more: false,
        })
    }

    #[test]
    fn key_ignores_case_but_not_paging() {
        let a = ResponseCache::cache_key("Красная БМВ", 0, 10, true, None);
        let b = ResponseCache::cache_key("красная бмв", 0, 10, true, None);
        let c = ResponseCache::cache_key("красная бмв", 10, 10, true, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn second_lookup_skips_computation() {
        let cache = ResponseCache::new(16, Duration::from_secs(60));
        let key = ResponseCache::cache_key("бмв до 3 млн", 0, 10, true, None);

        let first = cache
            .get_or_compute(key.clone(), async { response("computed") })
            .await;
        let second = cache
            .get_or_compute(key, async { response("recomputed") })
            .await;

        assert_eq!(first.message, "computed");
        assert_eq!(second.message, "computed");
        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn concurrent_identical_queries_compute_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = Arc::new(ResponseCache::new(16, Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = ResponseCache::cache_key("ладу до миллиона", 0, 10, true, None);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key, async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        response("once")
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().message, "once");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
