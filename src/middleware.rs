use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use crate::error::AppError;
use crate::rate_limit::extract_client_key;
use crate::state::AppState;

// Admission check in front of the API routes
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = extract_client_key(req.headers());

    if !state.rate_limiter.admit(&client) {
        return Err(AppError::RateLimited);
    }

    Ok(next.run(req).await)
}
