//! Response cache with per-entry TTL and a bounded entry count
//!
//! Entries are keyed by endpoint plus the normalized request payload. An
//! expired entry is treated as absent and removed when it is looked up. When
//! an insert pushes the cache over its cap, the oldest entry goes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Default maximum number of cached responses
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Cache key: endpoint and canonical payload
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    endpoint: String,
    payload: String,
}

impl CacheKey {
    /// Build a key
    ///
    /// `serde_json` objects keep their keys sorted, so two payloads that
    /// differ only in field order produce the same key.
    #[must_use]
    pub fn new(endpoint: &str, payload: &serde_json::Value) -> Self {
        let payload = if payload.is_null() {
            String::new()
        } else {
            payload.to_string()
        };
        Self {
            endpoint: endpoint.trim_matches('/').to_string(),
            payload,
        }
    }

    /// Endpoint part of the key
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// A cached response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached reply
    pub value: serde_json::Value,
    /// When this entry was stored
    pub inserted_at: Instant,
    /// How long it stays valid
    pub ttl: Duration,
    /// Number of times this entry has been served
    pub hits: u64,
}

impl CacheEntry {
    fn new(value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
            hits: 0,
        }
    }

    /// Whether the entry has outlived its TTL
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Cache counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries
    pub entries: usize,
    /// Lookups served from cache
    pub hits: u64,
    /// Lookups that missed (absent or expired)
    pub misses: u64,
    /// Entries removed because they expired
    pub expirations: u64,
    /// Entries removed to respect the size cap
    pub evictions: u64,
}

/// Bounded TTL cache for gate responses
#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<CacheKey, CacheEntry>,
    max_entries: usize,
    hits: u64,
    misses: u64,
    expirations: u64,
    evictions: u64,
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries` responses
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            hits: 0,
            misses: 0,
            expirations: 0,
            evictions: 0,
        }
    }

    /// Look up a live entry, dropping it if it has expired
    pub fn get(&mut self, key: &CacheKey) -> Option<serde_json::Value> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.hits += 1;
                self.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                self.expirations += 1;
                self.misses += 1;
                tracing::trace!(endpoint = key.endpoint(), "Cache entry expired");
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look at an entry without counting or expiring it
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store a response
    pub fn insert(&mut self, key: CacheKey, value: serde_json::Value, ttl: Duration) {
        self.entries.insert(key, CacheEntry::new(value, ttl));
        while self.entries.len() > self.max_entries {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.evictions += 1;
            tracing::trace!(endpoint = key.endpoint(), "Evicted oldest cache entry");
        }
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries (expired ones included until looked up)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            expirations: self.expirations,
            evictions: self.evictions,
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
