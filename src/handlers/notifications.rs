use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::error::AppError;
use crate::notifications::{Notification, NotificationKind};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateNotification {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    // falls back to the configured default when absent
    #[serde(default)]
    pub duration: Option<i64>,
}

#[derive(Serialize)]
pub struct CreatedNotification {
    pub id: String,
}

pub async fn list_notifications(State(state): State<Arc<AppState>>) -> Json<Vec<Notification>> {
    Json(state.notifications.active())
}

pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateNotification>,
) -> Result<(StatusCode, Json<CreatedNotification>), AppError> {
    if payload.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let notifications = &state.notifications;
    let id = match payload.kind {
        NotificationKind::Success => notifications.success(payload.message, payload.duration),
        NotificationKind::Error => notifications.error(payload.message, payload.duration),
        NotificationKind::Warning => notifications.warning(payload.message, payload.duration),
        NotificationKind::Info => notifications.info(payload.message, payload.duration),
    };

    Ok((StatusCode::CREATED, Json(CreatedNotification { id })))
}

pub async fn dismiss_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.notifications.dismiss(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("notification {} not found", id)))
    }
}
