//! Last-known item lists, replaced atomically after each successful fetch.
//!
//! Readers take a cheap snapshot (`Arc` clones) and never observe a
//! half-written list.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

/// One published item list.
#[derive(Debug)]
pub struct CacheEntry<T> {
    /// The items, shared with every notification that carries them.
    pub items: Arc<Vec<T>>,
    /// SHA-256 of the serialized items.
    pub checksum: String,
    /// Wall-clock time of the fetch.
    pub updated_at: DateTime<Utc>,
    /// Monotonic time of the fetch.
    fetched_at: Instant,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            checksum: self.checksum.clone(),
            updated_at: self.updated_at,
            fetched_at: self.fetched_at,
        }
    }
}

impl<T: Serialize> CacheEntry<T> {
    pub fn new(items: Vec<T>) -> Self {
        let checksum = checksum(&items);
        Self {
            items: Arc::new(items),
            checksum,
            updated_at: Utc::now(),
            fetched_at: Instant::now(),
        }
    }
}

impl<T> CacheEntry<T> {
    /// Time elapsed since the fetch.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Shared cache of one source.
#[derive(Debug)]
pub struct SourceCache<T> {
    entry: Arc<RwLock<Option<CacheEntry<T>>>>,
}

impl<T> Clone for SourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<T> Default for SourceCache<T> {
    fn default() -> Self {
        Self {
            entry: Arc::new(RwLock::new(None)),
        }
    }
}

impl<T: Serialize> SourceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list and returns the new entry.
    pub fn replace(&self, items: Vec<T>) -> CacheEntry<T> {
        let entry = CacheEntry::new(items);
        debug!(
            items = entry.items.len(),
            checksum = %entry.checksum,
            "Replaced cache entry"
        );
        let mut slot = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(entry.clone());
        entry
    }

    /// Current entry, if any fetch succeeded yet.
    pub fn snapshot(&self) -> Option<CacheEntry<T>> {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current items, empty before the first successful fetch.
    pub fn items(&self) -> Arc<Vec<T>> {
        self.snapshot()
            .map_or_else(|| Arc::new(Vec::new()), |entry| entry.items)
    }

    /// True when nothing was fetched yet or the last fetch is at least
    /// `interval` old.
    pub fn is_stale(&self, interval: Duration) -> bool {
        self.snapshot().is_none_or(|entry| entry.age() >= interval)
    }
}

/// SHA-256 hex digest of the JSON form of `items`.
pub fn checksum<T: Serialize>(items: &[T]) -> String {
    let json = serde_json::to_vec(items).unwrap_or_default();
    let digest = Sha256::digest(&json);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_json() {
        // sha256 of "[]"
        assert_eq!(
            checksum::<u32>(&[]),
            "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
        );
        assert_eq!(checksum(&[1, 2]), checksum(&[1, 2]));
        assert_ne!(checksum(&[1, 2]), checksum(&[2, 1]));
    }

    #[test]
    fn empty_cache() {
        let cache: SourceCache<u32> = SourceCache::new();
        assert!(cache.snapshot().is_none());
        assert!(cache.items().is_empty());
        assert!(cache.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn replace_is_visible_to_clones() {
        let cache = SourceCache::new();
        let reader = cache.clone();

        let entry = cache.replace(vec!["a".to_string()]);
        assert_eq!(entry.items.as_slice(), ["a".to_string()]);

        let seen = reader.snapshot().unwrap();
        assert_eq!(seen.checksum, entry.checksum);
        assert!(Arc::ptr_eq(&seen.items, &entry.items));
    }

    #[tokio::test(start_paused = true)]
    async fn staleness_follows_the_interval() {
        let cache = SourceCache::new();
        cache.replace(vec![1u32]);
        assert!(!cache.is_stale(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cache.is_stale(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.is_stale(Duration::from_secs(60)));
    }
}
