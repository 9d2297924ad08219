//! Replay cache for request nonces
//!
//! A nonce is admitted at most once within its TTL. [`MemoryNonceStore`] keeps
//! the cache in process memory and is only correct for a single gateway
//! instance; deployments with several instances need a shared store that
//! offers an atomic "set if absent with expiry" and implements [`NonceStore`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default cadence of opportunistic sweeps in [`MemoryNonceStore`]
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Replay cache contract
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Record `nonce` for `ttl` unless an unexpired entry already exists.
    ///
    /// Returns `true` when the nonce is fresh and was recorded, `false` when it
    /// is a duplicate. Concurrent calls with the same nonce must admit exactly
    /// one caller. Implementations that cannot reach their backing store
    /// return `false`.
    async fn add_if_not_exists(&self, nonce: &str, ttl: Duration) -> bool;

    /// Drop expired entries
    async fn cleanup(&self) {}
}

#[derive(Debug)]
struct NonceTable {
    /// nonce -> expiry
    entries: HashMap<String, Instant>,
    last_cleanup: Instant,
}

impl NonceTable {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        self.last_cleanup = now;
        before - self.entries.len()
    }
}

/// In-process nonce store
#[derive(Debug)]
pub struct MemoryNonceStore {
    table: Mutex<NonceTable>,
    cleanup_interval: Duration,
}

impl MemoryNonceStore {
    /// Create an empty store with the default sweep cadence
    pub fn new() -> Self {
        Self::with_cleanup_interval(DEFAULT_CLEANUP_INTERVAL)
    }

    /// Create an empty store that sweeps expired entries at most every `interval`
    pub fn with_cleanup_interval(interval: Duration) -> Self {
        Self {
            table: Mutex::new(NonceTable {
                entries: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
            cleanup_interval: interval,
        }
    }

    /// Number of entries held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Check if the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    fn admit(&self, nonce: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut table = self.table.lock();

        if now.duration_since(table.last_cleanup) >= self.cleanup_interval {
            let removed = table.sweep(now);
            tracing::trace!(removed, "Opportunistic nonce sweep");
        }

        if let Some(expires_at) = table.entries.get(nonce) {
            if *expires_at > now {
                tracing::trace!(nonce, "Nonce rejected as duplicate");
                return false;
            }
        }

        table.entries.insert(nonce.to_string(), now + ttl);
        tracing::trace!(nonce, ttl_ms = ttl.as_millis() as u64, "Nonce admitted");
        true
    }

    fn sweep_now(&self) -> usize {
        self.table.lock().sweep(Instant::now())
    }
}

impl Default for MemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn add_if_not_exists(&self, nonce: &str, ttl: Duration) -> bool {
        self.admit(nonce, ttl)
    }

    async fn cleanup(&self) {
        let removed = self.sweep_now();
        if removed > 0 {
            tracing::debug!(removed, "Expired nonces removed");
        }
    }
}

/// Run `store.cleanup()` every `interval` until the returned task is aborted
pub fn spawn_nonce_sweeper(store: Arc<dyn NonceStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.cleanup().await;
        }
    })
}
