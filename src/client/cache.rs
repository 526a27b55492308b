use std::time::{Duration, Instant};

use serde_json::Value;

/// A cached body payload with timestamp and staleness information.
///
/// Entries only ever hold the response body, never transport metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Value,
    pub updated_at: Instant,
    pub is_stale: bool,
}

impl CacheEntry {
    /// Creates a fresh entry with the given body.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            updated_at: Instant::now(),
            is_stale: false,
        }
    }

    /// Whether this entry counts as stale under the given stale time.
    pub fn is_stale_after(&self, stale_time: Duration) -> bool {
        self.is_stale || self.updated_at.elapsed() > stale_time
    }

    /// Marks this entry as stale.
    pub fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    /// Replaces the body, resetting timestamp and staleness.
    pub fn replace(&mut self, body: Value) {
        self.body = body;
        self.updated_at = Instant::now();
        self.is_stale = false;
    }

    /// Whether this entry is old enough to be garbage collected.
    pub fn should_gc(&self, cache_time: Duration) -> bool {
        self.updated_at.elapsed() > cache_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    #[test]
    fn test_new_entry_is_fresh() {
        let entry = CacheEntry::new(json!({"id": "1"}));
        assert!(!entry.is_stale);
        assert!(!entry.is_stale_after(Duration::from_secs(1)));
    }

    #[test]
    fn test_staleness_by_age() {
        let entry = CacheEntry::new(json!(1));
        sleep(Duration::from_millis(10));
        assert!(entry.is_stale_after(Duration::from_millis(5)));
    }

    #[test]
    fn test_mark_stale_and_replace() {
        let mut entry = CacheEntry::new(json!(1));
        entry.mark_stale();
        assert!(entry.is_stale_after(Duration::from_secs(3600)));

        entry.replace(json!(2));
        assert_eq!(entry.body, json!(2));
        assert!(!entry.is_stale);
    }

    #[test]
    fn test_should_gc() {
        let entry = CacheEntry::new(json!(1));
        assert!(!entry.should_gc(Duration::from_secs(60)));
        sleep(Duration::from_millis(10));
        assert!(entry.should_gc(Duration::from_millis(5)));
    }
}
