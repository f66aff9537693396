//! Engine capability contract
//!
//! Every synthesis backend implements [`SpeechEngine`]. The orchestration
//! layer only sees this trait: adapters own all vendor-specific request
//! mapping (rate/pitch scaling, SSML passthrough, container choice).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::EngineKind;
use crate::utils::unix_ms;

/// Opaque credential set injected into an adapter (key/value, vendor-named)
pub type CredentialMap = HashMap<String, String>;

/// Result type for engine adapter operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised inside engine adapters.
///
/// Infrastructure failures (network, subprocess, parse) are converted to these
/// variants at the adapter boundary; the orchestration layer re-wraps them
/// with the engine id into the gateway error taxonomy.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Engine cannot serve requests right now (binary missing, not initialized)
    #[error("engine not available: {0}")]
    NotAvailable(String),

    /// Required credentials absent or rejected upstream
    #[error("missing or invalid credentials: {0}")]
    MissingCredentials(String),

    /// Voice catalog fetch failed
    #[error("voice listing failed: {0}")]
    VoiceListing(String),

    /// Synthesis call failed; no partial audio is ever returned
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Adapter does not implement chunked synthesis
    #[error("streaming synthesis is not supported by this engine")]
    StreamingUnsupported,

    /// Bounded timeout expired on an outbound call or subprocess
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),

    /// Adapter was constructed with an unusable configuration
    #[error("invalid engine configuration: {0}")]
    InvalidConfiguration(String),
}

/// Audio containers the gateway can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Pcm16,
    Ogg,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Pcm16 => "pcm16",
            Self::Ogg => "ogg",
        }
    }

    /// Parse a client-supplied format name. ElevenLabs-style compound names
    /// (`mp3_44100_128`, `pcm_22050`) map onto the bare container.
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.to_lowercase();
        let container = lowered.split('_').next().unwrap_or(&lowered);
        match container {
            "mp3" | "mpeg" => Some(Self::Mp3),
            "wav" | "wave" | "riff" => Some(Self::Wav),
            "pcm" | "pcm16" | "raw" => Some(Self::Pcm16),
            "ogg" | "opus" | "vorbis" => Some(Self::Ogg),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Pcm16 => "audio/pcm",
            Self::Ogg => "audio/ogg",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A voice as reported by one engine, keyed by its native id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineVoice {
    /// Native id, opaque to everything above the adapter
    pub id: String,
    pub name: String,
    pub language: String,
    pub language_code: String,
    pub gender: Option<String>,
    pub description: Option<String>,
}

/// Normalized synthesis request handed to an adapter
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Normalized text (whitespace collapsed, control chars stripped)
    pub text: String,
    /// Native voice id for this engine
    pub voice_id: String,
    /// Negotiated output container (always in the adapter's supported set)
    pub format: AudioFormat,
    pub sample_rate: Option<u32>,
    pub stability: Option<f64>,
    pub similarity: Option<f64>,
    pub style: Option<f64>,
    /// Speaking speed multiplier, 0.25..=4.0
    pub speed: Option<f64>,
    /// Pitch shift in semitones, -20..=20
    pub pitch: Option<f64>,
}

/// Synthesized audio plus derived metadata
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Bytes,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub character_count: usize,
    /// Known only when the container declares it (PCM/WAV)
    pub duration_ms: Option<u64>,
}

/// Point-in-time view of an engine, surfaced by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub engine: EngineKind,
    pub enabled: bool,
    pub available: bool,
    pub supports_streaming: bool,
    pub supports_ssml: bool,
    pub formats: Vec<AudioFormat>,
    pub voice_count: Option<usize>,
    pub last_error: Option<String>,
    pub last_checked_ms: Option<u64>,
}

/// Shared health bookkeeping for adapters.
///
/// Adapters are invoked concurrently by many in-flight requests, so the cell
/// is the only mutable state they carry.
#[derive(Debug, Default)]
pub struct StatusCell {
    inner: Mutex<StatusInner>,
}

#[derive(Debug, Default, Clone)]
struct StatusInner {
    voice_count: Option<usize>,
    last_error: Option<String>,
    last_checked_ms: Option<u64>,
}

impl StatusCell {
    pub fn record_voices(&self, count: usize) {
        let mut inner = self.inner.lock();
        inner.voice_count = Some(count);
        inner.last_error = None;
        inner.last_checked_ms = Some(unix_ms());
    }

    pub fn record_ok(&self) {
        let mut inner = self.inner.lock();
        inner.last_error = None;
        inner.last_checked_ms = Some(unix_ms());
    }

    pub fn record_error(&self, error: &EngineError) {
        let mut inner = self.inner.lock();
        inner.last_error = Some(error.to_string());
        inner.last_checked_ms = Some(unix_ms());
    }

    pub fn voice_count(&self) -> Option<usize> {
        self.inner.lock().voice_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn last_checked_ms(&self) -> Option<u64> {
        self.inner.lock().last_checked_ms
    }
}

/// Capability contract implemented by every synthesis backend.
///
/// Implementations must be safe for concurrent use: all per-call state lives
/// in the [`SynthesisRequest`], never on the adapter.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Whether [`synthesize_stream`](Self::synthesize_stream) is implemented.
    /// Callers check this flag; they never probe by invoking the method.
    fn supports_streaming(&self) -> bool {
        false
    }

    fn supports_ssml(&self) -> bool {
        false
    }

    /// Containers this engine can produce, most-preferred first
    fn supported_formats(&self) -> &'static [AudioFormat];

    /// Usable right now: enabled and all required credentials present
    fn is_available(&self) -> bool;

    /// Fetch the native voice list
    async fn voices(&self) -> EngineResult<Vec<EngineVoice>>;

    /// Synthesize the complete utterance. On failure no audio is returned.
    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<SynthesisResult>;

    /// Chunked synthesis for engines that support it. Audio chunks are pushed
    /// into `chunks` as they arrive; the final result carries the metadata.
    async fn synthesize_stream(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::Sender<Bytes>,
    ) -> EngineResult<SynthesisResult> {
        let _ = (request, chunks);
        Err(EngineError::StreamingUnsupported)
    }

    /// Point-in-time status for the admin surface
    fn status(&self) -> EngineStatus;
}

/// Boxed engine handle shared by the registry and all in-flight requests
pub type EngineHandle = std::sync::Arc<dyn SpeechEngine>;

/// Derive a duration for raw 16-bit mono PCM payloads
pub fn pcm16_duration_ms(byte_len: usize, sample_rate: u32) -> Option<u64> {
    if sample_rate == 0 {
        return None;
    }
    Some((byte_len as u64 * 1000) / (2 * sample_rate as u64))
}
