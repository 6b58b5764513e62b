use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, TextEncoder, register_counter, register_gauge};


lazy_static! {
    pub static ref REQUESTS_ADMITTED: Counter =
        register_counter!("portal_requests_admitted_total", "Requests admitted by the rate limiter").unwrap();
    pub static ref REQUESTS_REJECTED: Counter =
        register_counter!("portal_requests_rejected_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref CLIENTS_SWEPT: Counter =
        register_counter!("portal_rate_limit_swept_total", "Stale client entries removed by the sweeper").unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("portal_rate_limit_tracked_clients", "Client keys currently tracked").unwrap();
    pub static ref NOTIFICATIONS_SHOWN: Counter =
        register_counter!("portal_notifications_shown_total", "Notifications raised").unwrap();
    pub static ref NOTIFICATIONS_DISMISSED: Counter =
        register_counter!("portal_notifications_dismissed_total", "Notifications removed, manually or by expiry").unwrap();
    pub static ref NOTIFICATIONS_ACTIVE: Gauge =
        register_gauge!("portal_notifications_active", "Notifications currently tracked").unwrap();
}

// Render the default registry in prometheus text format
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Encode error: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Metrics are not UTF-8: {}", e))
}
