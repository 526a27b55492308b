use std::time::Duration;

/// Configuration for cache behavior.
///
/// Controls how long cached bodies stay fresh and when they become eligible
/// for garbage collection. Individual query endpoints may override
/// `stale_time` through their options.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long data is considered fresh before becoming stale. Stale data
    /// is still served immediately, then refetched in the background.
    pub stale_time: Duration,

    /// How long cached data is retained before [`gc`](super::QueryClient::gc)
    /// will drop it.
    pub cache_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(0),      // immediately stale
            cache_time: Duration::from_secs(5 * 60), // 5 minutes
        }
    }
}

impl QueryConfig {
    /// Creates a configuration with the given stale and cache times.
    #[must_use]
    pub const fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
        }
    }

    /// Overrides the stale time, builder style.
    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Overrides the cache time, builder style.
    #[must_use]
    pub const fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueryConfig::default();
        assert_eq!(config.stale_time, Duration::from_secs(0));
        assert_eq!(config.cache_time, Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_builders() {
        let config = QueryConfig::default()
            .with_stale_time(Duration::from_secs(30))
            .with_cache_time(Duration::from_secs(300));
        assert_eq!(config.stale_time, Duration::from_secs(30));
        assert_eq!(config.cache_time, Duration::from_secs(300));
    }
}
