use axum::http::HeaderMap;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval};
use crate::config::RateLimitConfig;
use crate::metrics::{CLIENTS_SWEPT, REQUESTS_ADMITTED, REQUESTS_REJECTED, TRACKED_CLIENTS};

/// Shared bucket for requests that carry no usable address header.
pub const UNKNOWN_CLIENT: &str = "unknown";

// Rate limit entry - tracks requests per client key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: Instant,
}

impl RateLimitEntry {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_time: now + window,
        }
    }
}

/// Best-effort client identity from proxy headers.
///
/// Takes the first hop of `x-forwarded-for`, then `x-real-ip`, and falls back
/// to [`UNKNOWN_CLIENT`]. Empty or non UTF-8 values count as missing.
pub fn extract_client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    let forwarded = header("x-forwarded-for").and_then(|v| {
        v.split(',')
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    });
    if let Some(ip) = forwarded {
        return ip;
    }

    header("x-real-ip")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Fixed-window request counter keyed by client.
///
/// Each key gets `max_requests` admissions per window. The window starts on the
/// first request and a rejected client stays rejected until it rolls over.
/// Stale keys are reclaimed by [`RateLimiter::start_sweeper`].
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    config: RateLimitConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    pub fn admit_at(&self, key: &str, now: Instant) -> bool {
        let window = self.config.window;
        let max_requests = self.config.max_requests;

        let admitted = match self.entries.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitEntry::fresh(now, window));
                true
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if now > entry.reset_time {
                    // window expired, start a new one
                    *entry = RateLimitEntry::fresh(now, window);
                    true
                } else if entry.count >= max_requests {
                    false
                } else {
                    entry.count += 1;
                    true
                }
            }
        };

        if admitted {
            REQUESTS_ADMITTED.inc();
            tracing::debug!(client = key, "request admitted");
        } else {
            REQUESTS_REJECTED.inc();
            tracing::warn!(client = key, "rate limit exceeded");
        }
        TRACKED_CLIENTS.set(self.entries.len() as f64);

        admitted
    }

    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e)
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drops entries whose window ended more than one full window before `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            let keep = entry
                .reset_time
                .checked_add(window)
                .is_none_or(|stale_at| stale_at >= now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            CLIENTS_SWEPT.inc_by(removed as f64);
            tracing::debug!(removed, remaining = self.entries.len(), "swept stale rate limit entries");
        }
        TRACKED_CLIENTS.set(self.entries.len() as f64);

        removed
    }

    /// Spawns the periodic sweep on the current tokio runtime.
    ///
    /// The task only holds a weak reference, so it ends on its own once the
    /// limiter is dropped. Calling this again replaces the previous task.
    pub fn start_sweeper(self: &Arc<Self>) {
        let period = self.config.sweep_interval;
        let limiter: Weak<Self> = Arc::downgrade(self);

        let mut ticks = interval(period);
        let handle = tokio::spawn(async move {
            // first tick completes immediately
            ticks.tick().await;
            loop {
                ticks.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => {
                        limiter.sweep();
                    }
                    None => break,
                }
            }
        });

        tracing::info!(interval = ?period, "rate limit sweeper started");

        let mut slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the background sweep. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
            tracing::info!("rate limit sweeper stopped");
        }
    }

    pub fn sweeper_running(&self) -> bool {
        let slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
