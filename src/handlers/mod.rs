mod health;
mod metrics;
mod notifications;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use notifications::{create_notification, dismiss_notification, list_notifications};
