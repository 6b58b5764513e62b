use std::sync::Arc;
use crate::config::{ConfigError, NotificationConfig, RateLimitConfig};
use crate::notifications::NotificationBroadcaster;
use crate::rate_limit::RateLimiter;

// app's shared state
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub notifications: NotificationBroadcaster,
}

/// Composition root for the process-wide services.
///
/// `start` wires both services and launches the background sweep; `shutdown`
/// stops the sweep and cancels pending auto-dismiss timers.
pub struct Services {
    state: Arc<AppState>,
}

impl Services {
    pub fn start(
        rate_limit: RateLimitConfig,
        notifications: NotificationConfig,
    ) -> Result<Self, ConfigError> {
        rate_limit.validate()?;

        let rate_limiter = Arc::new(RateLimiter::new(rate_limit));
        rate_limiter.start_sweeper();

        Ok(Self {
            state: Arc::new(AppState {
                rate_limiter,
                notifications: NotificationBroadcaster::new(notifications),
            }),
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn shutdown(&self) {
        self.state.rate_limiter.shutdown();
        self.state.notifications.shutdown();
    }
}
