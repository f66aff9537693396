//! HTTP and WebSocket request handlers
//!
//! Handlers are grouped by surface:
//! - `elevenlabs` - ElevenLabs-compatible REST API
//! - `device` - minimal REST surface for embedded clients
//! - `admin` - key management, credentials, usage
//! - `ws` - WebSocket streaming protocol

pub mod admin;
pub mod device;
pub mod elevenlabs;
pub mod ws;

use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let engines = state.registry.available_engines();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "engines": engines,
    }))
}
