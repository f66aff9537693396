//! Authentication middleware
//!
//! Resolves the caller's API key, enforces its rate limit, and stores an
//! [`Auth`] context in request extensions for handlers downstream. When
//! authentication is disabled the request gets an open context instead.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::{Auth, extract_secret};
use crate::errors::GatewayError;
use crate::state::AppState;

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if !state.config.auth_required {
        request.extensions_mut().insert(Auth::Open);
        return Ok(next.run(request).await);
    }

    let secret = extract_secret(&request).ok_or_else(|| {
        GatewayError::Unauthorized("missing API key".to_string())
    })?;

    let key = state.keys.authenticate(&secret).await?;
    state.usage.check_rate_limit(&key)?;
    state.keys.touch(&key).await?;

    debug!(key_id = %key.id, path = %request.uri().path(), "request authenticated");
    request.extensions_mut().insert(Auth::Key(key));
    Ok(next.run(request).await)
}

/// Restricts a route tree to admin keys. Must run after [`auth_middleware`]
/// so the `Auth` extension is present.
pub async fn admin_guard(request: Request, next: Next) -> Result<Response, GatewayError> {
    let auth = request
        .extensions()
        .get::<Auth>()
        .ok_or_else(|| GatewayError::Unauthorized("missing authentication context".to_string()))?;

    if !auth.is_admin() {
        return Err(GatewayError::Forbidden(
            "admin privileges required".to_string(),
        ));
    }
    Ok(next.run(request).await)
}
