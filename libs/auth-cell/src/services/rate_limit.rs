use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Best-effort in-process throttle for login and magic-link requests, keyed
/// by caller address. State resets on process restart, which is acceptable:
/// this is not a correctness-critical component.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
    /// Hard cap on tracked keys so the map stays bounded.
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug)]
struct AttemptWindow {
    count: u32,
    window_start: Instant,
}

#[derive(Debug)]
pub struct LoginRateLimiter {
    config: RateLimitConfig,
    attempts: Mutex<HashMap<String, AttemptWindow>>,
}

pub struct RateLimited {
    pub retry_after: Duration,
}

impl LoginRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Record one attempt for `key` and decide whether it may proceed.
    pub fn try_acquire(&self, key: &str) -> Result<(), RateLimited> {
        self.try_acquire_at(key, Instant::now())
    }

    /// Time-injectable core of `try_acquire`, used directly by tests.
    pub fn try_acquire_at(&self, key: &str, now: Instant) -> Result<(), RateLimited> {
        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Expired windows are swept opportunistically on every call.
        let window = self.config.window;
        attempts.retain(|_, entry| now.duration_since(entry.window_start) < window);

        if let Some(entry) = attempts.get_mut(key) {
            if entry.count >= self.config.max_attempts {
                let elapsed = now.duration_since(entry.window_start);
                return Err(RateLimited {
                    retry_after: window.saturating_sub(elapsed),
                });
            }
            entry.count += 1;
            return Ok(());
        }

        if attempts.len() >= self.config.max_entries {
            // At capacity even after sweeping: drop the stalest key rather
            // than grow without bound.
            if let Some(stalest) = attempts
                .iter()
                .min_by_key(|(_, entry)| entry.window_start)
                .map(|(key, _)| key.clone())
            {
                warn!("Login rate limiter at capacity, evicting stalest entry");
                attempts.remove(&stalest);
            }
        }

        attempts.insert(
            key.to_string(),
            AttemptWindow {
                count: 1,
                window_start: now,
            },
        );
        Ok(())
    }

    pub fn tracked_keys(&self) -> usize {
        match self.attempts.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
