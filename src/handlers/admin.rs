//! Admin REST surface
//!
//! Key lifecycle, per-key engine configuration, system engine credentials,
//! and usage statistics. Every route here sits behind the admin guard.
//! Responses never include secret hashes or plaintext credential values;
//! the plaintext of a generated key appears exactly once, in the creation
//! response.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::engine::{
    CredentialMap, EngineKind, credential_fields, missing_required,
};
use crate::errors::{GatewayError, GatewayResult};
use crate::keys::{ApiKey, KeyEngineConfig};
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────
// Key lifecycle
// ─────────────────────────────────────────────────────────────────────────

/// Wire view of a key: everything except the secret hash
#[derive(Debug, Serialize)]
pub struct KeySummary {
    pub id: String,
    pub name: String,
    pub suffix: String,
    pub is_admin: bool,
    pub active: bool,
    pub rate_limit: u32,
    pub expires_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub last_used_ms: Option<u64>,
    pub request_count: u64,
    pub engines: std::collections::HashMap<String, KeyEngineConfig>,
}

impl From<ApiKey> for KeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            suffix: key.suffix,
            is_admin: key.is_admin,
            active: key.active,
            rate_limit: key.rate_limit,
            expires_at_ms: key.expires_at_ms,
            created_at_ms: key.created_at_ms,
            last_used_ms: key.last_used_ms,
            request_count: key.request_count,
            engines: key.engines,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyBody {
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    #[serde(default)]
    pub expires_at_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateKeyBody {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub rate_limit: Option<u32>,
    /// `Some(None)` clears the expiry, absent leaves it unchanged
    #[serde(default, with = "double_option")]
    pub expires_at_ms: Option<Option<u64>>,
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<u64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(de).map(Some)
    }
}

/// GET /admin/api/keys
pub async fn list_keys(State(state): State<Arc<AppState>>) -> GatewayResult<Response> {
    let keys: Vec<KeySummary> = state
        .keys
        .list()
        .await?
        .into_iter()
        .map(KeySummary::from)
        .collect();
    Ok(Json(json!({ "keys": keys })).into_response())
}

/// POST /admin/api/keys
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateKeyBody>,
) -> GatewayResult<Response> {
    if body.name.trim().is_empty() {
        return Err(GatewayError::Validation {
            field: "name".to_string(),
            message: "name must not be empty".to_string(),
        });
    }
    let generated = state
        .keys
        .generate(body.name.trim(), body.is_admin, body.rate_limit, body.expires_at_ms)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "key": KeySummary::from(generated.key),
            // Shown once; only the hash is stored.
            "secret": generated.secret,
        })),
    )
        .into_response())
}

/// GET /admin/api/keys/{id}
pub async fn get_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> GatewayResult<Response> {
    let key = state.keys.get(&id).await?;
    Ok(Json(KeySummary::from(key)).into_response())
}

/// PUT /admin/api/keys/{id}
pub async fn update_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateKeyBody>,
) -> GatewayResult<Response> {
    let mut key = state.keys.get(&id).await?;
    if let Some(name) = body.name {
        key = key.with_name(name);
    }
    if let Some(active) = body.active {
        key = key.with_active(active);
    }
    if let Some(rate_limit) = body.rate_limit {
        key = key.with_rate_limit(rate_limit);
    }
    if let Some(expires) = body.expires_at_ms {
        key = key.with_expiry(expires);
    }
    let key = state.keys.save(key).await?;
    Ok(Json(KeySummary::from(key)).into_response())
}

/// DELETE /admin/api/keys/{id}
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> GatewayResult<Response> {
    state.keys.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// PUT /admin/api/keys/{id}/engines
///
/// Replaces the key's per-engine configuration wholesale with the given map.
pub async fn update_key_engines(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<std::collections::HashMap<String, KeyEngineConfig>>,
) -> GatewayResult<Response> {
    let mut key = state.keys.get(&id).await?;
    key.engines.clear();
    for (name, config) in body {
        let engine = EngineKind::parse(&name).ok_or_else(|| GatewayError::Validation {
            field: "engines".to_string(),
            message: format!("unknown engine '{name}'"),
        })?;
        key = key.with_engine_config(engine, config);
    }
    let key = state.keys.save(key).await?;
    Ok(Json(KeySummary::from(key)).into_response())
}

// ─────────────────────────────────────────────────────────────────────────
// Engines and system credentials
// ─────────────────────────────────────────────────────────────────────────

/// GET /admin/api/engines/status
pub async fn engine_statuses(State(state): State<Arc<AppState>>) -> Response {
    let statuses = state.registry.statuses().await;
    Json(json!({ "engines": statuses })).into_response()
}

/// GET /admin/api/settings/credentials
///
/// Reports which fields each engine wants and which are set. Values are
/// never echoed back.
pub async fn credential_settings(State(state): State<Arc<AppState>>) -> Response {
    let engines: Vec<_> = EngineKind::ALL
        .iter()
        .map(|kind| {
            let configured = state.registry.credentials_for(*kind);
            let fields: Vec<_> = credential_fields(*kind)
                .iter()
                .map(|f| {
                    json!({
                        "key": f.key,
                        "label": f.label,
                        "required": f.required,
                        "secret": f.secret,
                        "set": configured.contains_key(f.key),
                    })
                })
                .collect();
            json!({
                "engine": kind.as_str(),
                "configured": state.registry.is_configured(*kind),
                "fields": fields,
            })
        })
        .collect();
    Json(json!({ "engines": engines })).into_response()
}

fn parse_engine(name: &str) -> GatewayResult<EngineKind> {
    EngineKind::parse(name).ok_or_else(|| GatewayError::Validation {
        field: "engine".to_string(),
        message: format!("unknown engine '{name}'"),
    })
}

/// PUT /admin/api/settings/credentials/{engine}
pub async fn set_credentials(
    State(state): State<Arc<AppState>>,
    Path(engine): Path<String>,
    Json(credentials): Json<CredentialMap>,
) -> GatewayResult<Response> {
    let kind = parse_engine(&engine)?;
    let missing = missing_required(kind, &credentials);
    if !missing.is_empty() {
        return Err(GatewayError::Validation {
            field: "credentials".to_string(),
            message: format!("missing required fields: {}", missing.join(", ")),
        });
    }
    state.registry.set_credentials(kind, credentials);
    // Changed credentials can change the voice roster.
    state.catalog.invalidate();
    Ok(Json(json!({ "engine": kind.as_str(), "updated": true })).into_response())
}

/// POST /admin/api/settings/credentials/{engine}/test
///
/// Builds a throwaway instance with the given credentials and probes its
/// voice listing; nothing is stored.
pub async fn test_credentials(
    State(state): State<Arc<AppState>>,
    Path(engine): Path<String>,
    Json(credentials): Json<CredentialMap>,
) -> GatewayResult<Response> {
    let kind = parse_engine(&engine)?;
    match state.registry.test_credentials(kind, &credentials).await {
        Ok(voice_count) => Ok(Json(json!({
            "engine": kind.as_str(),
            "ok": true,
            "voice_count": voice_count,
        }))
        .into_response()),
        Err(e) => Ok(Json(json!({
            "engine": kind.as_str(),
            "ok": false,
            "error": e.to_string(),
        }))
        .into_response()),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Usage and mode
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct UsageQuery {
    pub key_id: Option<String>,
    pub limit: Option<usize>,
}

/// GET /admin/api/usage
pub async fn usage(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let key_id = query.key_id.as_deref();
    let stats = state.usage.stats(key_id);
    let records = state.usage.records_for(key_id, query.limit.unwrap_or(100));
    Json(json!({ "stats": stats, "records": records })).into_response()
}

/// GET /admin/api/mode
pub async fn mode(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "auth_required": state.config.auth_required,
        "tls": state.config.is_tls_enabled(),
    }))
    .into_response()
}
