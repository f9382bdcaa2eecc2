//! Request Gate
//!
//! Every request/response call to the inference server goes through a
//! [`RequestGate`], which provides two things:
//!
//! - **Concurrency bound**: at most `max_concurrent` requests in flight.
//!   Callers beyond that wait in arrival order (tokio's semaphore is fair)
//!   with no bound on the wait itself.
//! - **Response cache**: replies are cached per endpoint and payload, with a
//!   short TTL for volatile endpoints and a long one for near-static data.
//!
//! # Design
//!
//! One semaphore lives as long as the gate, so the bound holds across
//! [`RequestGate::cleanup`]. Waiters also watch a reset token; cleanup
//! cancels it (failing every queued waiter with [`StreamError::Aborted`])
//! and installs a fresh token for later callers.

mod cache;

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;

pub use cache::{CacheEntry, CacheKey, CacheStats, ResponseCache, DEFAULT_MAX_ENTRIES};

// ============================================================================
// Configuration
// ============================================================================

/// Gate tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateConfig {
    /// Requests allowed in flight at once
    pub max_concurrent: usize,
    /// TTL for volatile endpoints
    pub short_ttl: Duration,
    /// TTL for near-static endpoints
    pub long_ttl: Duration,
    /// Cache size cap
    pub max_cache_entries: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            short_ttl: Duration::from_secs(30),
            long_ttl: Duration::from_secs(300),
            max_cache_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// How long a reply may be served from cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never cached
    Uncached,
    /// Volatile data (completions, embeddings)
    Short,
    /// Near-static data (model list, model details, server version)
    Long,
}

/// Gate counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateStats {
    /// Requests currently running
    pub in_flight: usize,
    /// Callers waiting for a slot
    pub queued: usize,
    /// Requests that ran to an answer or an error
    pub completed: u64,
    /// Highest in-flight count seen
    pub peak_in_flight: usize,
    /// Cache counters
    pub cache: CacheStats,
}

/// Atomic counters for lock-free updates
#[derive(Default)]
struct GateStatsAtomic {
    in_flight: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicU64,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when the request ends, however it ends
struct InFlight {
    stats: Arc<GateStatsAtomic>,
}

impl InFlight {
    fn enter(stats: &Arc<GateStatsAtomic>) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_in_flight.fetch_max(now, Ordering::Relaxed);
        Self {
            stats: Arc::clone(stats),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// A slot in the gate; the slot frees when this is dropped
pub struct GatePermit {
    // Field order matters: the in-flight count drops before the slot frees
    _in_flight: InFlight,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit").finish_non_exhaustive()
    }
}

/// Decrements the queued count when the caller leaves the queue
struct Queued<'a> {
    stats: &'a GateStatsAtomic,
}

impl<'a> Queued<'a> {
    fn enter(stats: &'a GateStatsAtomic) -> Self {
        stats.queued.fetch_add(1, Ordering::SeqCst);
        Self { stats }
    }
}

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        self.stats.queued.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Request Gate
// ============================================================================

/// Concurrency-limiting, caching facade over request/response calls
pub struct RequestGate {
    config: GateConfig,
    semaphore: Arc<Semaphore>,
    reset: RwLock<CancellationToken>,
    cache: Mutex<ResponseCache>,
    stats: Arc<GateStatsAtomic>,
}

impl RequestGate {
    /// Create a gate
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            reset: RwLock::new(CancellationToken::new()),
            cache: Mutex::new(ResponseCache::new(config.max_cache_entries)),
            stats: Arc::new(GateStatsAtomic::default()),
            config,
        }
    }

    /// Gate configuration
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn ttl(&self, policy: CachePolicy) -> Option<Duration> {
        match policy {
            CachePolicy::Uncached => None,
            CachePolicy::Short => Some(self.config.short_ttl),
            CachePolicy::Long => Some(self.config.long_ttl),
        }
    }

    /// Run `request` under the concurrency bound, consulting the cache first
    ///
    /// `endpoint` and `payload` form the cache key. Errors from `request`
    /// propagate unchanged and are never cached.
    ///
    /// # Errors
    ///
    /// [`StreamError::Aborted`] if [`RequestGate::cleanup`] runs while the
    /// caller is queued; otherwise whatever `request` returns.
    pub async fn execute<F, Fut>(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
        policy: CachePolicy,
        request: F,
    ) -> Result<serde_json::Value, StreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, StreamError>>,
    {
        let ttl = self.ttl(policy);
        let key = CacheKey::new(endpoint, payload);

        if ttl.is_some() {
            if let Some(hit) = self.cache.lock().get(&key) {
                tracing::debug!(endpoint, "Gate cache hit");
                return Ok(hit);
            }
        }

        let _permit = self.acquire().await?;

        // A caller ahead in the queue may have filled the entry meanwhile
        if ttl.is_some() {
            let now = Instant::now();
            let filled = self
                .cache
                .lock()
                .peek(&key)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.value.clone());
            if let Some(hit) = filled {
                return Ok(hit);
            }
        }

        tracing::debug!(endpoint, "Gate request started");
        let result = request().await;

        match (&result, ttl) {
            (Ok(value), Some(ttl)) => {
                self.cache.lock().insert(key, value.clone(), ttl);
            }
            (Err(e), _) => {
                tracing::debug!(endpoint, error = %e, "Gate request failed");
            }
            _ => {}
        }
        result
    }

    /// Wait for a free slot, in arrival order
    ///
    /// The slot counts as in flight until the permit is dropped.
    ///
    /// # Errors
    ///
    /// [`StreamError::Aborted`] if [`RequestGate::cleanup`] runs while
    /// waiting.
    pub async fn acquire(&self) -> Result<GatePermit, StreamError> {
        let reset = self.reset.read().clone();
        let permit = {
            let _queued = Queued::enter(&self.stats);
            tokio::select! {
                biased;
                () = reset.cancelled() => return Err(StreamError::Aborted),
                permit = Arc::clone(&self.semaphore).acquire_owned() => {
                    permit.map_err(|_| StreamError::Aborted)?
                }
            }
        };
        Ok(GatePermit {
            _in_flight: InFlight::enter(&self.stats),
            _permit: permit,
        })
    }

    /// Drop the cache and fail every queued caller
    ///
    /// Requests already running finish normally and keep their slots, so
    /// callers arriving afterwards still wait for them.
    pub fn cleanup(&self) {
        let stale = std::mem::replace(&mut *self.reset.write(), CancellationToken::new());
        stale.cancel();
        self.cache.lock().clear();
        tracing::info!("Request gate reset");
    }

    /// Drop cached replies only
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> GateStats {
        GateStats {
            in_flight: self.stats.in_flight.load(Ordering::SeqCst),
            queued: self.stats.queued.load(Ordering::SeqCst),
            completed: self.stats.completed.load(Ordering::Relaxed),
            peak_in_flight: self.stats.peak_in_flight.load(Ordering::Relaxed),
            cache: self.cache.lock().stats(),
        }
    }
}

impl Default for RequestGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
