//! WebSocket streaming protocol
//!
//! One task per connection. Authentication happens once at connect time,
//! from the `api_key` query parameter or the usual header set; a failed
//! handshake still upgrades so the client receives one error frame before
//! the close. After that the connection serves repeated `speak`, `voices`
//! and `engines` commands. Outgoing traffic funnels through a single writer
//! task so JSON and binary frames never interleave mid-message.

pub mod messages;

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::{Auth, secret_from_headers, secret_from_query};
use crate::core::engine::{AudioFormat, EngineKind};
use crate::core::speech::SpeakRequest;
use crate::errors::GatewayError;
use crate::state::AppState;
use crate::usage::UsageRecord;
use crate::utils::{extract_pcm_from_wav, unix_ms};

use messages::{ClientCommand, ErrorFrame, MessageRoute, ServerFrame};

const CHANNEL_BUFFER_SIZE: usize = 64;
/// Chunk size when `stream: true` is requested without an explicit size
const DEFAULT_CHUNK_SIZE: usize = 8_192;

/// GET /ws and GET /api/ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: axum::http::Uri,
) -> Response {
    let secret = secret_from_headers(&headers).or_else(|| uri.query().and_then(secret_from_query));
    ws.on_upgrade(move |socket| handle_socket(socket, state, secret))
}

async fn authenticate(state: &AppState, secret: Option<String>) -> Result<Auth, GatewayError> {
    if !state.config.auth_required {
        return Ok(Auth::Open);
    }
    let secret = secret.ok_or_else(|| GatewayError::Unauthorized("missing API key".to_string()))?;
    let key = state.keys.authenticate(&secret).await?;
    Ok(Auth::Key(key))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, secret: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Single writer task; everything outbound goes through the channel.
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, MessageRoute::Close);
            let result = match route {
                MessageRoute::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("failed to serialize frame: {e}");
                        continue;
                    }
                },
                MessageRoute::Error(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("failed to serialize error frame: {e}");
                        continue;
                    }
                },
                MessageRoute::Binary(data) => sender.send(Message::Binary(data)).await,
                MessageRoute::Close => sender.send(Message::Close(None)).await,
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    let auth = match authenticate(&state, secret).await {
        Ok(auth) => {
            info!(key_id = %auth.key_id(), "WebSocket connection authenticated");
            auth
        }
        Err(e) => {
            // One error frame, then close; the client never reaches Ready.
            let _ = message_tx
                .send(MessageRoute::Error(ErrorFrame {
                    error: e.public_message(),
                    code: e.code(),
                }))
                .await;
            let _ = message_tx.send(MessageRoute::Close).await;
            let _ = sender_task.await;
            return;
        }
    };

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !handle_command(&text, &state, &auth, &message_tx).await {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(key_id = %auth.key_id(), "WebSocket closed by client");
                break;
            }
            Ok(Message::Binary(_)) => {
                send_error(
                    &message_tx,
                    GatewayError::Validation {
                        field: "frame".to_string(),
                        message: "binary frames are not accepted".to_string(),
                    },
                )
                .await;
            }
            // Ping/Pong are answered by the transport.
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket read error: {e}");
                break;
            }
        }
    }

    let _ = message_tx.send(MessageRoute::Close).await;
    drop(message_tx);
    let _ = sender_task.await;
}

async fn send_error(tx: &mpsc::Sender<MessageRoute>, error: GatewayError) {
    let _ = tx
        .send(MessageRoute::Error(ErrorFrame {
            error: error.public_message(),
            code: error.code(),
        }))
        .await;
}

/// Returns false to drop the connection.
async fn handle_command(
    text: &str,
    state: &Arc<AppState>,
    auth: &Auth,
    tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            send_error(
                tx,
                GatewayError::Validation {
                    field: "command".to_string(),
                    message: format!("unrecognized command frame: {e}"),
                },
            )
            .await;
            return true;
        }
    };

    let result = match command {
        ClientCommand::Voices => handle_voices(state, tx).await,
        ClientCommand::Engines => handle_engines(state, tx).await,
        ClientCommand::Speak {
            text,
            voice,
            engine,
            format,
            sample_rate,
            speed,
            pitch,
            stream,
            chunk_size,
        } => {
            handle_speak(
                state,
                auth,
                tx,
                SpeakParams {
                    text,
                    voice,
                    engine,
                    format,
                    sample_rate,
                    speed,
                    pitch,
                    stream: stream.unwrap_or(false),
                    chunk_size,
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        send_error(tx, e).await;
    }
    true
}

async fn handle_voices(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<MessageRoute>,
) -> Result<(), GatewayError> {
    let snapshot = state.catalog.snapshot().await?;
    let voices = snapshot
        .voices()
        .iter()
        .map(|v| {
            serde_json::json!({
                "id": v.id,
                "name": v.name,
                "engine": v.engine.as_str(),
                "language": v.language_code,
            })
        })
        .collect();
    let _ = tx.send(MessageRoute::Frame(ServerFrame::Voices { voices })).await;
    Ok(())
}

async fn handle_engines(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<MessageRoute>,
) -> Result<(), GatewayError> {
    let engines = state
        .registry
        .statuses()
        .await
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.engine.as_str(),
                "enabled": s.enabled,
                "available": s.available,
            })
        })
        .collect();
    let _ = tx.send(MessageRoute::Frame(ServerFrame::Engines { engines })).await;
    Ok(())
}

struct SpeakParams {
    text: String,
    voice: String,
    engine: Option<String>,
    format: Option<String>,
    sample_rate: Option<u32>,
    speed: Option<f64>,
    pitch: Option<f64>,
    stream: bool,
    chunk_size: Option<usize>,
}

async fn handle_speak(
    state: &Arc<AppState>,
    auth: &Auth,
    tx: &mpsc::Sender<MessageRoute>,
    params: SpeakParams,
) -> Result<(), GatewayError> {
    if let Some(key) = auth.key() {
        state.usage.check_rate_limit(key)?;
    }

    let engine = match params.engine.as_deref() {
        None => None,
        Some(raw) => Some(EngineKind::parse(raw).ok_or_else(|| {
            GatewayError::Validation {
                field: "engine".to_string(),
                message: format!("unknown engine '{raw}'"),
            }
        })?),
    };
    let format = params
        .format
        .as_deref()
        .and_then(AudioFormat::parse)
        .unwrap_or(AudioFormat::Pcm16);

    let request = SpeakRequest {
        text: params.text,
        voice: params.voice,
        engine,
        format: Some(format),
        sample_rate: params.sample_rate,
        stability: None,
        similarity: None,
        style: None,
        speed: params.speed,
        pitch: params.pitch,
        streaming: true,
    };

    let outcome = state.speech.synthesize(&request, auth.key()).await?;
    let result = outcome.result;

    // PCM clients get raw samples even from engines that wrap them in WAV.
    let (audio, format, sample_rate) =
        if format == AudioFormat::Pcm16 && result.format == AudioFormat::Wav {
            let pcm = extract_pcm_from_wav(&result.audio).map_err(|e| {
                GatewayError::SpeechGenerationFailed {
                    engine: outcome.voice.engine,
                    reason: format!("returned an unreadable WAV container: {e}"),
                }
            })?;
            (Bytes::from(pcm.samples), AudioFormat::Pcm16, pcm.sample_rate)
        } else {
            (result.audio, result.format, result.sample_rate)
        };

    let chunk_size = if params.stream {
        params.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1)
    } else {
        audio.len().max(1)
    };
    let chunks = audio.len().div_ceil(chunk_size).max(1);

    let _ = tx
        .send(MessageRoute::Frame(ServerFrame::Meta {
            format: format.as_str().to_string(),
            sample_rate,
            engine: outcome.voice.engine.as_str().to_string(),
            voice: outcome.voice.unified_id.clone(),
            bytes: audio.len(),
            chunks,
        }))
        .await;

    if audio.is_empty() {
        let _ = tx.send(MessageRoute::Binary(Bytes::new())).await;
    } else {
        let mut offset = 0;
        while offset < audio.len() {
            let end = (offset + chunk_size).min(audio.len());
            let _ = tx.send(MessageRoute::Binary(audio.slice(offset..end))).await;
            offset = end;
        }
    }

    let _ = tx
        .send(MessageRoute::Frame(ServerFrame::End {
            bytes: audio.len(),
            chunks,
        }))
        .await;

    state.usage.record(UsageRecord {
        key_id: auth.key_id().to_string(),
        engine: outcome.voice.engine,
        voice: outcome.voice.unified_id,
        path: "/ws".to_string(),
        status: 200,
        characters: result.character_count,
        audio_bytes: audio.len(),
        duration_ms: result.duration_ms,
        timestamp_ms: unix_ms(),
    });
    if let Some(key) = auth.key() {
        if let Err(e) = state.keys.touch(key).await {
            warn!(key_id = %key.id, error = %e, "failed to record key usage");
        }
    }
    Ok(())
}
