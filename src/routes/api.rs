//! Route tables for every HTTP surface
//!
//! Authentication middleware is layered on in `build_router` once the
//! application state exists; the admin router additionally carries the
//! admin guard.

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, device, elevenlabs, ws};
use crate::state::AppState;
use std::sync::Arc;

/// ElevenLabs-compatible surface under /v1
pub fn create_v1_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/voices", get(elevenlabs::list_voices))
        .route("/v1/voices/{voice_id}", get(elevenlabs::get_voice))
        .route(
            "/v1/text-to-speech/{voice_id}",
            post(elevenlabs::text_to_speech),
        )
        .route(
            "/v1/text-to-speech/{voice_id}/stream",
            post(elevenlabs::text_to_speech_stream),
        )
        .route(
            "/v1/text-to-speech/{voice_id}/stream/with-timestamps",
            post(elevenlabs::text_to_speech_with_timestamps),
        )
        .route("/v1/models", get(elevenlabs::list_models))
        .route("/v1/user", get(elevenlabs::get_user))
        .route("/v1/user/subscription", get(elevenlabs::get_subscription))
        .layer(TraceLayer::new_for_http())
}

/// Embedded-device surface under /api
pub fn create_device_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/speak", post(device::speak))
        .route("/api/voices", get(device::list_voices))
        .route("/api/engines", get(device::list_engines))
        .route("/api/ping", get(device::ping))
        .layer(TraceLayer::new_for_http())
}

/// Admin surface under /admin/api
pub fn create_admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/admin/api/keys",
            get(admin::list_keys).post(admin::create_key),
        )
        .route(
            "/admin/api/keys/{id}",
            get(admin::get_key)
                .put(admin::update_key)
                .delete(admin::delete_key),
        )
        .route(
            "/admin/api/keys/{id}/engines",
            put(admin::update_key_engines),
        )
        .route("/admin/api/engines/status", get(admin::engine_statuses))
        .route(
            "/admin/api/settings/credentials",
            get(admin::credential_settings),
        )
        .route(
            "/admin/api/settings/credentials/{engine}",
            put(admin::set_credentials),
        )
        .route(
            "/admin/api/settings/credentials/{engine}/test",
            post(admin::test_credentials),
        )
        .route("/admin/api/usage", get(admin::usage))
        .route("/admin/api/mode", get(admin::mode))
        .layer(TraceLayer::new_for_http())
}

/// WebSocket surface; authentication happens inside the handler so a bad
/// key still gets an error frame instead of a failed upgrade.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
}
