//! ElevenLabs-compatible REST surface
//!
//! Wire shapes follow the vendor API closely enough for existing ElevenLabs
//! clients to point at the gateway unchanged: voice listings, text-to-speech
//! with `voice_settings`, the `/stream` variant, and the with-timestamps
//! variant returning base64 audio plus alignment arrays. Engines without
//! timestamp support return empty alignment arrays, not an error.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::Auth;
use crate::core::engine::{AudioFormat, EngineKind};
use crate::core::speech::{SpeakRequest, SpeechOutcome};
use crate::core::voice::Voice;
use crate::errors::{GatewayError, GatewayResult};
use crate::state::AppState;
use crate::usage::UsageRecord;
use crate::utils::unix_ms;

// ─────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub voice_id: String,
    pub name: String,
    pub category: &'static str,
    pub description: Option<String>,
    pub labels: VoiceLabels,
}

#[derive(Debug, Serialize)]
pub struct VoiceLabels {
    pub language: String,
    pub accent: String,
    pub gender: Option<String>,
    pub engine: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct VoiceSettings {
    pub stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub style: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TextToSpeechBody {
    pub text: String,
    #[serde(default)]
    pub voice_settings: Option<VoiceSettings>,
    /// Vendor-style format name, e.g. `mp3_44100_128` or `pcm_22050`
    #[serde(default)]
    pub output_format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OutputFormatQuery {
    pub output_format: Option<String>,
}

fn voice_response(voice: &Voice) -> VoiceResponse {
    VoiceResponse {
        voice_id: voice.id.clone(),
        name: voice.name.clone(),
        category: "premade",
        description: voice.description.clone(),
        labels: VoiceLabels {
            language: voice.language.clone(),
            accent: voice.language_code.clone(),
            gender: voice.gender.clone(),
            engine: voice.engine.as_str().to_string(),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Voice listing
// ─────────────────────────────────────────────────────────────────────────

/// GET /v1/voices
pub async fn list_voices(State(state): State<Arc<AppState>>) -> GatewayResult<Response> {
    let snapshot = state.catalog.snapshot().await?;
    let voices: Vec<VoiceResponse> = snapshot.voices().iter().map(voice_response).collect();
    Ok(Json(json!({ "voices": voices })).into_response())
}

/// GET /v1/voices/{id}
pub async fn get_voice(
    State(state): State<Arc<AppState>>,
    Path(voice_id): Path<String>,
) -> GatewayResult<Response> {
    let resolved = state.catalog.resolve(&voice_id, None).await?;
    let snapshot = state.catalog.snapshot().await?;
    let voice = snapshot
        .get(&resolved.unified_id)
        .ok_or_else(|| GatewayError::VoiceNotFound(voice_id))?;
    Ok(Json(voice_response(voice)).into_response())
}

// ─────────────────────────────────────────────────────────────────────────
// Text to speech
// ─────────────────────────────────────────────────────────────────────────

fn speak_request(voice_id: String, body: TextToSpeechBody, query: OutputFormatQuery) -> SpeakRequest {
    let settings = body.voice_settings.unwrap_or_default();
    // Body takes precedence over the query parameter, matching the vendor.
    let format = body
        .output_format
        .or(query.output_format)
        .as_deref()
        .and_then(AudioFormat::parse);
    SpeakRequest {
        text: body.text,
        voice: voice_id,
        engine: None,
        format,
        sample_rate: None,
        stability: settings.stability,
        similarity: settings.similarity_boost,
        style: settings.style,
        speed: settings.speed,
        pitch: None,
        streaming: false,
    }
}

async fn synthesize(
    state: &AppState,
    auth: &Auth,
    path: &str,
    request: &SpeakRequest,
) -> GatewayResult<SpeechOutcome> {
    let outcome = state.speech.synthesize(request, auth.key()).await?;
    state.usage.record(UsageRecord {
        key_id: auth.key_id().to_string(),
        engine: outcome.voice.engine,
        voice: outcome.voice.unified_id.clone(),
        path: path.to_string(),
        status: StatusCode::OK.as_u16(),
        characters: outcome.result.character_count,
        audio_bytes: outcome.result.audio.len(),
        duration_ms: outcome.result.duration_ms,
        timestamp_ms: unix_ms(),
    });
    Ok(outcome)
}

fn audio_response(outcome: SpeechOutcome) -> Response {
    let result = outcome.result;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        result.format.content_type().parse().unwrap_or_else(|_| {
            header::HeaderValue::from_static("application/octet-stream")
        }),
    );
    if let Ok(value) = result.format.as_str().parse() {
        headers.insert("x-audio-format", value);
    }
    if let Ok(value) = result.sample_rate.to_string().parse() {
        headers.insert("x-sample-rate", value);
    }
    if let Ok(value) = result.character_count.to_string().parse() {
        headers.insert("x-character-count", value);
    }
    (StatusCode::OK, headers, result.audio).into_response()
}

/// POST /v1/text-to-speech/{voiceId}
pub async fn text_to_speech(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
    Path(voice_id): Path<String>,
    Query(query): Query<OutputFormatQuery>,
    Json(body): Json<TextToSpeechBody>,
) -> GatewayResult<Response> {
    let request = speak_request(voice_id, body, query);
    let outcome = synthesize(&state, &auth, "/v1/text-to-speech", &request).await?;
    Ok(audio_response(outcome))
}

/// POST /v1/text-to-speech/{voiceId}/stream
///
/// Chunked-transfer variant; the response body is identical to the
/// non-stream route, the difference is purely transport framing.
pub async fn text_to_speech_stream(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
    Path(voice_id): Path<String>,
    Query(query): Query<OutputFormatQuery>,
    Json(body): Json<TextToSpeechBody>,
) -> GatewayResult<Response> {
    let mut request = speak_request(voice_id, body, query);
    request.streaming = true;
    let outcome = synthesize(&state, &auth, "/v1/text-to-speech/stream", &request).await?;
    Ok(audio_response(outcome))
}

/// POST /v1/text-to-speech/{voiceId}/stream/with-timestamps
///
/// None of the routed engines produce character timestamps, so alignment
/// arrays are always empty; clients relying on them see a degraded but
/// wire-compatible response.
pub async fn text_to_speech_with_timestamps(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
    Path(voice_id): Path<String>,
    Query(query): Query<OutputFormatQuery>,
    Json(body): Json<TextToSpeechBody>,
) -> GatewayResult<Response> {
    let mut request = speak_request(voice_id, body, query);
    request.streaming = true;
    let outcome = synthesize(
        &state,
        &auth,
        "/v1/text-to-speech/stream/with-timestamps",
        &request,
    )
    .await?;

    let alignment = json!({
        "characters": [],
        "character_start_times_seconds": [],
        "character_end_times_seconds": [],
    });
    Ok(Json(json!({
        "audio_base64": BASE64.encode(&outcome.result.audio),
        "alignment": alignment.clone(),
        "normalized_alignment": alignment,
    }))
    .into_response())
}

// ─────────────────────────────────────────────────────────────────────────
// Models and account info
// ─────────────────────────────────────────────────────────────────────────

/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let models: Vec<_> = EngineKind::ALL
        .iter()
        .filter(|kind| state.registry.is_configured(**kind))
        .map(|kind| {
            json!({
                "model_id": format!("voxgate_{}", kind.as_str()),
                "name": format!("Voxgate {} routing", kind.as_str()),
                "can_do_text_to_speech": true,
                "can_do_voice_conversion": false,
                "languages": [],
            })
        })
        .collect();
    Json(models).into_response()
}

fn subscription_body(state: &AppState, auth: &Auth) -> serde_json::Value {
    let stats = state.usage.stats(auth.key().map(|k| k.id.as_str()));
    let (tier, limit) = if auth.is_admin() {
        ("admin", u64::MAX / 2)
    } else {
        ("free", 1_000_000)
    };
    json!({
        "tier": tier,
        "character_count": stats.total_characters,
        "character_limit": limit,
        "can_extend_character_limit": false,
        "status": "active",
    })
}

/// GET /v1/user
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
) -> Response {
    let suffix = auth.key().map(|k| k.suffix.clone()).unwrap_or_default();
    Json(json!({
        "user_id": auth.key_id(),
        "is_new_user": false,
        "xi_api_key": suffix,
        "subscription": subscription_body(&state, &auth),
    }))
    .into_response()
}

/// GET /v1/user/subscription
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
) -> Response {
    Json(subscription_body(&state, &auth)).into_response()
}
