pub mod api;

pub use api::{create_admin_router, create_device_router, create_v1_router, create_ws_router};

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::handlers;
use crate::middleware::{admin_guard, auth_middleware};
use crate::state::AppState;

/// Assemble the full application router with authentication layered on.
/// Transport-level layers (CORS, IP throttling, security headers) are added
/// by the binary; tests drive this router directly.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = create_v1_router()
        .merge(create_device_router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Layer order (outer to inner): auth -> admin guard -> handler.
    let admin = create_admin_router()
        .layer(axum_middleware::from_fn(admin_guard))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // WebSocket routes authenticate inside the handler.
    let ws = create_ws_router();

    let public = Router::new().route("/health", get(handlers::health));

    public
        .merge(protected)
        .merge(admin)
        .merge(ws)
        .with_state(state)
}
