//! The query client: shared cache and invalidation engine.
//!
//! [`QueryClient`] is the central state manager the endpoint layer wraps.
//! It owns the cache (keyed by [`QueryKey`], storing body payloads only),
//! staleness and garbage-collection bookkeeping, and the notification
//! channel that wakes live query streams when data changes under them.
//!
//! The client is injected into the [`Api`](crate::api::Api) factory and
//! shared by every endpoint created from it; endpoints never hold a private
//! copy of cached data. Multiple independently configured clients coexist
//! without interference, which is what makes endpoints testable in
//! isolation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use opquery::client::{QueryClient, QueryConfig};
//!
//! let config = QueryConfig::new(
//!     Duration::from_secs(30),  // stale_time
//!     Duration::from_secs(300), // cache_time
//! );
//! let client = Arc::new(QueryClient::with_config(config));
//! ```

mod cache;
mod config;

pub use cache::CacheEntry;
pub use config::QueryConfig;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::key::QueryKey;

/// A cache event broadcast to live query streams.
///
/// `Invalidated` and `Cancelled` carry a key *prefix*; `Updated` carries the
/// exact key that was written.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Entries under this prefix were marked stale and should refetch.
    Invalidated(QueryKey),
    /// In-flight fetches under this prefix should stop.
    Cancelled(QueryKey),
    /// This exact key received fresh data.
    Updated(QueryKey),
}

/// The shared cache and invalidation engine.
#[derive(Debug)]
pub struct QueryClient {
    cache: DashMap<QueryKey, CacheEntry>,
    notify_tx: broadcast::Sender<Notification>,
    config: QueryConfig,
}

impl QueryClient {
    /// Creates a client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a client with the given configuration.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        let (notify_tx, _) = broadcast::channel(100);
        Self {
            cache: DashMap::new(),
            notify_tx,
            config,
        }
    }

    /// The client's configuration.
    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Subscribes to cache notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    /// Reads the entry for `key`, if cached.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.cache.get(key).map(|entry| entry.value().clone())
    }

    /// Writes `body` under `key`, resetting staleness, and notifies live
    /// streams. Only body payloads belong here; transport metadata never
    /// enters the cache.
    pub fn set_query_data(&self, key: QueryKey, body: Value) {
        debug!(key = %key, "cache write");
        self.cache
            .entry(key.clone())
            .and_modify(|entry| entry.replace(body.clone()))
            .or_insert_with(|| CacheEntry::new(body));
        let _ = self.notify_tx.send(Notification::Updated(key));
    }

    /// Marks every entry under `prefix` stale and notifies live streams so
    /// they refetch.
    pub fn invalidate_queries(&self, prefix: &QueryKey) {
        debug!(prefix = %prefix, "invalidating queries");
        for mut entry in self.cache.iter_mut() {
            if entry.key().starts_with(prefix) {
                entry.value_mut().mark_stale();
            }
        }
        let _ = self.notify_tx.send(Notification::Invalidated(prefix.clone()));
    }

    /// Asks live streams to drop in-flight fetches under `prefix`.
    pub fn cancel_queries(&self, prefix: &QueryKey) {
        let _ = self.notify_tx.send(Notification::Cancelled(prefix.clone()));
    }

    /// Removes the entry for `key`, returning it if present.
    pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.cache.remove(key).map(|(_, entry)| entry)
    }

    /// Drops entries older than the configured cache time.
    pub fn gc(&self) {
        let cache_time = self.config.cache_time;
        self.cache.retain(|_, entry| !entry.should_gc(cache_time));
    }

    /// The number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}
