//! In-memory recommendation cache
//!
//! Keyed by the seed track, the last three history entries and the request
//! options. Entries expire after a fixed TTL; the least recently used entry
//! is evicted when the cache is full.

use super::{RecommendationDescriptor, RecommendationOptions};
use crate::text::normalize;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use vcmp_common::CanonicalTrackDescriptor;

/// History entries that take part in the cache key
pub const HISTORY_KEY_ENTRIES: usize = 3;

#[derive(Debug, Clone)]
struct CacheEntry {
    recommendations: Vec<RecommendationDescriptor>,
    inserted_at: Instant,
}

/// TTL + LRU cache of validated recommendation lists
pub struct RecommendationCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
}

impl RecommendationCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    /// Cached list, if present and not expired
    pub fn get(&mut self, key: &str, now: Instant) -> Option<Vec<RecommendationDescriptor>> {
        let expired = match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                return Some(entry.recommendations.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.pop(key);
        }
        None
    }

    pub fn put(&mut self, key: String, recommendations: Vec<RecommendationDescriptor>, now: Instant) {
        self.entries.put(
            key,
            CacheEntry {
                recommendations,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache key for a recommendation request
///
/// Only the most recent [`HISTORY_KEY_ENTRIES`] history entries count, and
/// every text field is normalised so cosmetic differences still hit.
pub fn cache_key(
    seed: &CanonicalTrackDescriptor,
    history: &[CanonicalTrackDescriptor],
    options: &RecommendationOptions,
) -> String {
    let mut hasher = Sha256::new();

    let mut feed = |descriptor: &CanonicalTrackDescriptor| {
        hasher.update(normalize(&descriptor.artist).as_bytes());
        hasher.update(b"\x1f");
        hasher.update(normalize(&descriptor.title).as_bytes());
        hasher.update(b"\x1e");
    };

    feed(seed);
    let skip = history.len().saturating_sub(HISTORY_KEY_ENTRIES);
    for entry in &history[skip..] {
        feed(entry);
    }

    hasher.update(options.count.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> CanonicalTrackDescriptor {
        CanonicalTrackDescriptor::new("Daft Punk", "One More Time")
    }

    fn history(titles: &[&str]) -> Vec<CanonicalTrackDescriptor> {
        titles
            .iter()
            .map(|t| CanonicalTrackDescriptor::new("Artist", *t))
            .collect()
    }

    #[test]
    fn test_key_ignores_cosmetic_differences() {
        let options = RecommendationOptions { count: 5 };
        let a = cache_key(&seed(), &[], &options);
        let b = cache_key(
            &CanonicalTrackDescriptor::new("DAFT PUNK", "One  More Time!"),
            &[],
            &options,
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_key_uses_only_last_three_history_entries() {
        let options = RecommendationOptions { count: 5 };
        let long = cache_key(&seed(), &history(&["a", "b", "c", "d"]), &options);
        let short = cache_key(&seed(), &history(&["b", "c", "d"]), &options);
        let different = cache_key(&seed(), &history(&["a", "b", "c"]), &options);
        assert_eq!(long, short);
        assert_ne!(long, different);
    }

    #[test]
    fn test_key_depends_on_options() {
        let a = cache_key(&seed(), &[], &RecommendationOptions { count: 5 });
        let b = cache_key(&seed(), &[], &RecommendationOptions { count: 10 });
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let mut cache = RecommendationCache::new(10, Duration::from_secs(1800));
        let now = Instant::now();
        let recs = vec![RecommendationDescriptor::new("Justice", "D.A.N.C.E.")];

        cache.put("k".to_string(), recs.clone(), now);
        assert_eq!(cache.get("k", now + Duration::from_secs(1799)), Some(recs));
        assert_eq!(cache.get("k", now + Duration::from_secs(1800)), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_least_recently_used_is_evicted() {
        let mut cache = RecommendationCache::new(2, Duration::from_secs(60));
        let now = Instant::now();
        cache.put("a".to_string(), Vec::new(), now);
        cache.put("b".to_string(), Vec::new(), now);
        cache.get("a", now);
        cache.put("c".to_string(), Vec::new(), now);

        assert!(cache.get("a", now).is_some());
        assert!(cache.get("b", now).is_none());
        assert_eq!(cache.len(), 2);
    }
}
