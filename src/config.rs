use clap::Parser;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_NOTIFICATION_DURATION_MS: i64 = 5_000;

/// Upper bound for both the window and the sweep interval.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "portal-gateway")]
#[command(about = "Request admission and notification fan-out for the portal")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Rate limit max requests per window
    #[arg(long, default_value_t = DEFAULT_MAX_REQUESTS)]
    pub rate_limit: u32,

    // Rate limit window in milliseconds
    #[arg(long, default_value_t = DEFAULT_WINDOW_MS)]
    pub rate_window_ms: u64,

    // How often stale rate limit entries are swept
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,

    // Default auto-dismiss delay; zero or negative keeps notifications until dismissed
    #[arg(long, default_value_t = DEFAULT_NOTIFICATION_DURATION_MS, allow_negative_numbers = true)]
    pub notification_duration_ms: i64,
}

impl Args {
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit,
            window: Duration::from_millis(self.rate_window_ms),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    pub fn notification_config(&self) -> NotificationConfig {
        NotificationConfig {
            default_duration_ms: self.notification_duration_ms,
        }
    }
}

/// Fixed-window limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    /// Period of the background pass that drops stale entries.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_millis(DEFAULT_WINDOW_MS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if self.window > MAX_PERIOD {
            return Err(ConfigError::WindowTooLarge);
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if self.sweep_interval > MAX_PERIOD {
            return Err(ConfigError::SweepIntervalTooLarge);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationConfig {
    pub default_duration_ms: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: DEFAULT_NOTIFICATION_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroMaxRequests,
    ZeroWindow,
    WindowTooLarge,
    ZeroSweepInterval,
    SweepIntervalTooLarge,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroMaxRequests => write!(f, "rate limit must allow at least one request"),
            ConfigError::ZeroWindow => write!(f, "rate limit window must be non-zero"),
            ConfigError::WindowTooLarge => {
                write!(f, "rate limit window must not exceed {:?}", MAX_PERIOD)
            }
            ConfigError::ZeroSweepInterval => write!(f, "sweep interval must be non-zero"),
            ConfigError::SweepIntervalTooLarge => {
                write!(f, "sweep interval must not exceed {:?}", MAX_PERIOD)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
