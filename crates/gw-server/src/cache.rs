//! In-memory TTL cache keyed by the `x-bf-cache-key` request header (spec
//! §6): a `RwLock<HashMap<...>>` of entries, each stamped with its own
//! expiry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use gw_core::Response;

struct Entry {
    response: Response,
    expires_at: Instant,
}

/// Caches full non-streaming responses by caller-supplied key, so a repeat
/// request for the same `x-bf-cache-key` skips dispatch entirely.
#[derive(Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Response> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.response.clone())
    }

    pub fn put(&self, key: String, response: Response, ttl: Duration) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key, Entry { response, expires_at: Instant::now() + ttl });
    }

    /// `DELETE /api/cache/{key}` (spec §6). Returns whether an entry existed.
    pub fn evict(&self, key: &str) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }
}

/// Parse the `x-bf-cache-ttl` header: either a bare seconds integer or a Go
/// duration string (`"30s"`, `"5m"`, `"1h"`) as the original allowed.
pub fn parse_ttl(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (digits, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::Message;

    #[test]
    fn put_then_get_round_trips_before_expiry() {
        let cache = ResponseCache::new();
        let response = Response::chat("openai", "gpt-4o-mini", Message::assistant("hi"));
        cache.put("k1".into(), response, Duration::from_secs(60));
        assert!(cache.get("k1").is_some());
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache = ResponseCache::new();
        let response = Response::chat("openai", "gpt-4o-mini", Message::assistant("hi"));
        cache.put("k1".into(), response, Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k1").is_none());
    }

    #[test]
    fn evict_removes_entry() {
        let cache = ResponseCache::new();
        let response = Response::chat("openai", "gpt-4o-mini", Message::assistant("hi"));
        cache.put("k1".into(), response, Duration::from_secs(60));
        assert!(cache.evict("k1"));
        assert!(cache.get("k1").is_none());
    }

    #[test]
    fn parse_ttl_accepts_bare_seconds_and_go_duration() {
        assert_eq!(parse_ttl("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_ttl("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_ttl("1h"), Some(Duration::from_secs(3600)));
    }
}
