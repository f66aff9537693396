//! Minimal REST surface for embedded clients
//!
//! Small boards speak plain HTTP and want raw PCM they can push straight to
//! a DAC: `/api/speak` defaults to 16-bit PCM and describes the payload in
//! headers so the client never parses a container.

use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Auth;
use crate::core::engine::{AudioFormat, EngineKind};
use crate::core::speech::SpeakRequest;
use crate::errors::{GatewayError, GatewayResult};
use crate::state::AppState;
use crate::usage::UsageRecord;
use crate::utils::{extract_pcm_from_wav, unix_ms};

#[derive(Debug, Deserialize)]
pub struct SpeakBody {
    pub text: String,
    pub voice: String,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub pitch: Option<f64>,
}

fn parse_engine(value: Option<&str>) -> GatewayResult<Option<EngineKind>> {
    match value {
        None => Ok(None),
        Some(raw) => EngineKind::parse(raw)
            .map(Some)
            .ok_or_else(|| GatewayError::Validation {
                field: "engine".to_string(),
                message: format!("unknown engine '{raw}'"),
            }),
    }
}

/// POST /api/speak
pub async fn speak(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
    Json(body): Json<SpeakBody>,
) -> GatewayResult<Response> {
    let engine = parse_engine(body.engine.as_deref())?;
    let format = body
        .format
        .as_deref()
        .and_then(AudioFormat::parse)
        .unwrap_or(AudioFormat::Pcm16);

    let request = SpeakRequest {
        text: body.text,
        voice: body.voice,
        engine,
        format: Some(format),
        sample_rate: body.sample_rate,
        stability: None,
        similarity: None,
        style: None,
        speed: body.speed,
        pitch: body.pitch,
        streaming: false,
    };

    let outcome = state.speech.synthesize(&request, auth.key()).await?;
    let result = outcome.result;

    // Engines that only emit WAV still serve PCM clients: pull the samples
    // out of the container here.
    let (audio, format, sample_rate, channels, bit_depth) =
        if format == AudioFormat::Pcm16 && result.format == AudioFormat::Wav {
            let pcm = extract_pcm_from_wav(&result.audio).map_err(|e| {
                GatewayError::SpeechGenerationFailed {
                    engine: outcome.voice.engine,
                    reason: format!("returned an unreadable WAV container: {e}"),
                }
            })?;
            (
                Bytes::from(pcm.samples),
                AudioFormat::Pcm16,
                pcm.sample_rate,
                pcm.channels,
                pcm.bits_per_sample,
            )
        } else {
            let bit_depth = if result.format == AudioFormat::Pcm16 { 16 } else { 0 };
            (result.audio, result.format, result.sample_rate, 1, bit_depth)
        };

    state.usage.record(UsageRecord {
        key_id: auth.key_id().to_string(),
        engine: outcome.voice.engine,
        voice: outcome.voice.unified_id.clone(),
        path: "/api/speak".to_string(),
        status: StatusCode::OK.as_u16(),
        characters: result.character_count,
        audio_bytes: audio.len(),
        duration_ms: result.duration_ms,
        timestamp_ms: unix_ms(),
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(format.content_type()),
    );
    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = value.parse() {
            headers.insert(name, value);
        }
    };
    set("x-audio-format", format.as_str().to_string());
    set("x-sample-rate", sample_rate.to_string());
    set("x-channels", channels.to_string());
    set("x-bit-depth", bit_depth.to_string());
    set("x-character-count", result.character_count.to_string());
    if let Some(duration) = result.duration_ms {
        set("x-duration-ms", duration.to_string());
    }

    Ok((StatusCode::OK, headers, audio).into_response())
}

/// GET /api/voices
pub async fn list_voices(State(state): State<Arc<AppState>>) -> GatewayResult<Response> {
    let snapshot = state.catalog.snapshot().await?;
    let voices: Vec<_> = snapshot
        .voices()
        .iter()
        .map(|v| {
            json!({
                "id": v.id,
                "name": v.name,
                "engine": v.engine.as_str(),
                "language": v.language_code,
            })
        })
        .collect();
    Ok(Json(json!({ "voices": voices })).into_response())
}

/// GET /api/engines
pub async fn list_engines(State(state): State<Arc<AppState>>) -> Response {
    let statuses = state.registry.statuses().await;
    let engines: Vec<_> = statuses
        .iter()
        .map(|s| {
            json!({
                "id": s.engine.as_str(),
                "enabled": s.enabled,
                "available": s.available,
                "formats": s.formats,
            })
        })
        .collect();
    Json(json!({ "engines": engines })).into_response()
}

/// GET /api/ping
pub async fn ping() -> Response {
    Json(json!({ "status": "ok", "time_ms": unix_ms() })).into_response()
}
