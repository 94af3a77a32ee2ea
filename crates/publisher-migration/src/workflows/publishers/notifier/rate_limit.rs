use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Suppresses a key that was already let through within `window`.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Returns `true` and records `now` when `key` is outside its window.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        // A poisoned map only loses suppression history.
        let mut last_sent = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match last_sent.get(key) {
            Some(previous) if now.saturating_duration_since(*previous) < self.window => false,
            _ => {
                let window = self.window;
                last_sent.retain(|_, sent| now.saturating_duration_since(*sent) < window);
                last_sent.insert(key.to_string(), now);
                true
            }
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.last_sent.lock().map(|map| map.len()).unwrap_or_default()
    }
}
