//! Request admission and notification fan-out for the portal front end.
//!
//! Two independent services live here: a fixed-window [`rate_limit::RateLimiter`]
//! keyed by client address, and a [`notifications::NotificationBroadcaster`]
//! that pushes transient messages to in-process subscribers. [`state::Services`]
//! owns both for the lifetime of the server.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod notifications;
pub mod rate_limit;
pub mod state;

use axum::{
    Router, middleware::from_fn_with_state, routing::{delete, get}
};
use std::sync::Arc;
use crate::handlers::{
    create_notification, dismiss_notification, health_handler, list_notifications, metrics_handler,
};
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;

// health and metrics stay reachable for probes even when a client is limited
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/notifications", get(list_notifications).post(create_notification))
        .route("/api/notifications/{id}", delete(dismiss_notification))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .with_state(state)
}
