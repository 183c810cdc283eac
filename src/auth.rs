//! Shared-secret check for inbound sync calls

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the shared sync secret
pub const SYNC_TOKEN_HEADER: &str = "x-sync-token";

/// Validate a presented token against the configured secret.
///
/// A server without a secret refuses every call with a configuration error
/// rather than running open.
pub fn authorize(configured: Option<&str>, presented: Option<&str>) -> Result<(), AppError> {
    let secret = configured
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Configuration("sync shared secret is not configured".to_string()))?;

    let token = presented
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Authentication(format!("missing {} header", SYNC_TOKEN_HEADER)))?;

    if constant_time_eq(token, secret) {
        Ok(())
    } else {
        Err(AppError::Authentication("invalid sync token".to_string()))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Middleware guarding the sync routes
pub async fn require_sync_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(SYNC_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());

    authorize(state.config().sync.shared_secret.as_deref(), presented)?;

    Ok(next.run(request).await)
}
