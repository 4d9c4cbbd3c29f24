//! Per-client fixed-window rate limiting for `/analyze`.
//!
//! Each client key gets a counter that resets when its window elapses. The
//! check and the increment happen under one lock, so two concurrent requests
//! from the same client can never both take the last slot.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sweep expired windows once the map grows past this many keys.
const PURGE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Seconds until the client's window resets (at least 1).
    Rejected { retry_after: u64 },
}

/// `limit` requests per `window`, e.g. `10/minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit { limit: 10, window: Duration::from_secs(60) }
    }
}

impl FromStr for RateLimit {
    type Err = String;

    /// Parses `N/second`, `N/minute`, `N/hour` (or `N per minute`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(" per ", "/");
        let (count, unit) = normalized
            .split_once('/')
            .ok_or_else(|| format!("expected N/<unit>, got '{s}'"))?;
        let limit: u32 = count
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a request count", count.trim()))?;
        if limit == 0 {
            return Err("request count must be at least 1".into());
        }
        let window = match unit.trim() {
            "second" | "s" => Duration::from_secs(1),
            "minute" | "m" | "min" => Duration::from_secs(60),
            "hour" | "h" => Duration::from_secs(3600),
            other => return Err(format!("unknown window unit '{other}'")),
        };
        Ok(RateLimit { limit, window })
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.window.as_secs() {
            1 => write!(f, "{}/second", self.limit),
            60 => write!(f, "{}/minute", self.limit),
            3600 => write!(f, "{}/hour", self.limit),
            _ => write!(f, "{}/{:?}", self.limit, self.window),
        }
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimit,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimit) -> Self {
        RateLimiter { config, windows: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> RateLimit {
        self.config
    }

    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Admission decision for a request arriving at `now`.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let window_len = self.config.window;
        // Counters stay meaningful even if a holder panicked mid-update.
        let mut windows = self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() > PURGE_THRESHOLD {
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window_len);
        }

        let window = windows
            .entry(key.to_owned())
            .or_insert(Window { started: now, count: 0 });

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= window_len {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.config.limit {
            let remaining = window_len.saturating_sub(now.saturating_duration_since(window.started));
            let retry_after = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Admission::Rejected { retry_after: retry_after.max(1) };
        }

        window.count += 1;
        Admission::Allowed
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }
}
