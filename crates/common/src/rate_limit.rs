use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Per-key sliding-window request counter with periodic compaction
/// (§4.B). Unlike the token-bucket limiter the gateway clients use for
/// outbound rate limiting, this tracks event timestamps per key so the
/// window can be inspected exactly rather than approximated.
pub struct RateLimiter {
    window: Duration,
    limit: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    events: HashMap<String, Vec<Instant>>,
    last_compaction: Instant,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            window,
            limit,
            inner: Mutex::new(Inner {
                events: HashMap::new(),
                last_compaction: Instant::now(),
            }),
        }
    }

    /// Returns true iff `key` has made fewer than `limit` allowed calls
    /// within the trailing window, then records this call. `limit == 0`
    /// forbids all traffic unconditionally.
    pub async fn allow(&self, key: &str) -> bool {
        if self.limit == 0 {
            return false;
        }

        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let cutoff = now.checked_sub(self.window).unwrap_or(now);
        let entry = inner.events.entry(key.to_string()).or_default();
        entry.retain(|&t| t > cutoff);

        let allowed = entry.len() < self.limit;
        if allowed {
            entry.push(now);
        }

        tracing::debug!(key, allowed, count = entry.len(), "rate limiter decision");

        if now.duration_since(inner.last_compaction) > self.window {
            Self::compact(&mut inner.events, now, self.window);
            inner.last_compaction = now;
        }

        allowed
    }

    fn compact(events: &mut HashMap<String, Vec<Instant>>, now: Instant, window: Duration) {
        let cutoff = now.checked_sub(window).unwrap_or(now);
        let before = events.len();
        events.retain(|_, timestamps| {
            timestamps.retain(|&t| t > cutoff);
            !timestamps.is_empty()
        });
        let evicted = before - events.len();
        tracing::debug!(evicted, "rate limiter compaction pass");
    }
}
