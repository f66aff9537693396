//! TTS orchestration
//!
//! Validates requests, normalizes text, resolves the target voice, negotiates
//! an output format the chosen engine actually supports, and drives the
//! adapter. All engine failures are re-wrapped with the engine id before they
//! leave this module.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::engine::{
    AudioFormat, EngineError, EngineKind, EngineRegistry, SynthesisRequest, SynthesisResult,
};
use crate::core::voice::{ResolvedVoice, VoiceCatalog};
use crate::errors::{GatewayError, GatewayResult};
use crate::keys::ApiKey;
use crate::utils::normalize_text;

/// Length ceiling for one-shot synthesis
pub const MAX_TEXT_LENGTH: usize = 5_000;
/// Length ceiling for streaming synthesis
pub const MAX_STREAMING_TEXT_LENGTH: usize = 10_000;

/// A validated, engine-agnostic synthesis request
#[derive(Debug, Clone, Default)]
pub struct SpeakRequest {
    pub text: String,
    pub voice: String,
    pub engine: Option<EngineKind>,
    pub format: Option<AudioFormat>,
    pub sample_rate: Option<u32>,
    pub stability: Option<f64>,
    pub similarity: Option<f64>,
    pub style: Option<f64>,
    pub speed: Option<f64>,
    pub pitch: Option<f64>,
    /// Streaming requests get the larger text ceiling
    pub streaming: bool,
}

/// Synthesis output plus the voice it resolved to
#[derive(Debug, Clone)]
pub struct SpeechOutcome {
    pub result: SynthesisResult,
    pub voice: ResolvedVoice,
}

pub struct SpeechService {
    registry: Arc<EngineRegistry>,
    catalog: Arc<VoiceCatalog>,
}

fn check_range(field: &str, value: Option<f64>, min: f64, max: f64) -> GatewayResult<()> {
    if let Some(v) = value {
        if !(min..=max).contains(&v) || !v.is_finite() {
            return Err(GatewayError::Validation {
                field: field.to_string(),
                message: format!("must be between {min} and {max}, got {v}"),
            });
        }
    }
    Ok(())
}

/// Wrap an adapter failure into the domain taxonomy, carrying the engine id
fn map_engine_error(engine: EngineKind, error: EngineError) -> GatewayError {
    match error {
        EngineError::NotAvailable(_) => GatewayError::EngineNotAvailable(engine),
        EngineError::MissingCredentials(_) => GatewayError::MissingCredentials(engine),
        EngineError::StreamingUnsupported => GatewayError::Validation {
            field: "stream".to_string(),
            message: format!("engine '{engine}' does not support streaming synthesis"),
        },
        other => GatewayError::SpeechGenerationFailed {
            engine,
            reason: other.to_string(),
        },
    }
}

impl SpeechService {
    pub fn new(registry: Arc<EngineRegistry>, catalog: Arc<VoiceCatalog>) -> Self {
        Self { registry, catalog }
    }

    /// Normalize and validate a request, returning the text to synthesize.
    ///
    /// Character counts for limits and billing are taken from the normalized
    /// text, not the raw payload.
    pub fn validate(&self, request: &SpeakRequest) -> GatewayResult<String> {
        let text = normalize_text(&request.text);
        if text.is_empty() {
            return Err(GatewayError::InvalidText(
                "text is empty after normalization".to_string(),
            ));
        }

        let max = if request.streaming {
            MAX_STREAMING_TEXT_LENGTH
        } else {
            MAX_TEXT_LENGTH
        };
        let length = text.chars().count();
        if length > max {
            return Err(GatewayError::TextTooLong { length, max });
        }

        check_range("stability", request.stability, 0.0, 1.0)?;
        check_range("similarity", request.similarity, 0.0, 1.0)?;
        check_range("style", request.style, 0.0, 1.0)?;
        check_range("speed", request.speed, 0.25, 4.0)?;
        check_range("pitch", request.pitch, -20.0, 20.0)?;

        Ok(text)
    }

    /// Negotiate an output container: the requested one when the engine
    /// supports it, else the engine's first supported format. Formats are a
    /// negotiation, never a hard failure.
    pub fn resolve_format(
        requested: Option<AudioFormat>,
        supported: &[AudioFormat],
    ) -> AudioFormat {
        match requested {
            Some(format) if supported.contains(&format) => format,
            _ => supported.first().copied().unwrap_or(AudioFormat::Wav),
        }
    }

    /// Full synthesis flow for one request.
    ///
    /// `key` carries the caller's per-engine allow-list and optional custom
    /// credentials; `None` means an unauthenticated development-mode caller.
    pub async fn synthesize(
        &self,
        request: &SpeakRequest,
        key: Option<&ApiKey>,
    ) -> GatewayResult<SpeechOutcome> {
        let text = self.validate(request)?;
        let voice = self.catalog.resolve(&request.voice, request.engine).await?;

        if let Some(key) = key {
            if !key.can_access_engine(voice.engine) {
                debug!(key_id = %key.id, engine = %voice.engine, "engine disabled for key");
                return Err(GatewayError::EngineNotAvailable(voice.engine));
            }
        }

        let overrides = key.and_then(|k| k.engine_credentials(voice.engine));
        let engine = self
            .registry
            .engine_with_credentials(voice.engine, overrides)
            .await
            .map_err(|e| map_engine_error(voice.engine, e))?;

        if !engine.is_available() {
            return Err(GatewayError::EngineNotAvailable(voice.engine));
        }

        let format = Self::resolve_format(request.format, engine.supported_formats());
        let synthesis = SynthesisRequest {
            text,
            voice_id: voice.native_id.clone(),
            format,
            sample_rate: request.sample_rate,
            stability: request.stability,
            similarity: request.similarity,
            style: request.style,
            speed: request.speed,
            pitch: request.pitch,
        };

        let result = engine
            .synthesize(&synthesis)
            .await
            .map_err(|e| map_engine_error(voice.engine, e))?;

        info!(
            engine = %voice.engine,
            voice = %voice.unified_id,
            characters = result.character_count,
            bytes = result.audio.len(),
            format = %result.format,
            "synthesis complete"
        );

        Ok(SpeechOutcome { result, voice })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> SpeakRequest {
        SpeakRequest {
            text: text.to_string(),
            voice: "espeak:en".to_string(),
            ..Default::default()
        }
    }

    fn service() -> SpeechService {
        let registry = Arc::new(EngineRegistry::new(Default::default()));
        let catalog = Arc::new(VoiceCatalog::new(registry.clone()));
        SpeechService::new(registry, catalog)
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let service = service();
        assert!(matches!(
            service.validate(&request("")),
            Err(GatewayError::InvalidText(_))
        ));
        // Whitespace-only collapses to empty.
        assert!(matches!(
            service.validate(&request("  \n\t ")),
            Err(GatewayError::InvalidText(_))
        ));
    }

    #[test]
    fn test_length_ceiling_depends_on_streaming() {
        let service = service();
        let long = "a".repeat(7_000);

        let mut req = request(&long);
        assert!(matches!(
            service.validate(&req),
            Err(GatewayError::TextTooLong { max: MAX_TEXT_LENGTH, .. })
        ));

        req.streaming = true;
        assert!(service.validate(&req).is_ok());

        req.text = "a".repeat(11_000);
        assert!(matches!(
            service.validate(&req),
            Err(GatewayError::TextTooLong { max: MAX_STREAMING_TEXT_LENGTH, .. })
        ));
    }

    #[test]
    fn test_range_validation_names_the_field() {
        let service = service();
        let mut req = request("hello");
        req.speed = Some(9.0);

        match service.validate(&req) {
            Err(GatewayError::Validation { field, .. }) => assert_eq!(field, "speed"),
            other => panic!("expected validation error, got {other:?}"),
        }

        req.speed = Some(1.0);
        req.pitch = Some(-30.0);
        match service.validate(&req) {
            Err(GatewayError::Validation { field, .. }) => assert_eq!(field, "pitch"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_format_negotiation_falls_back() {
        let supported = [AudioFormat::Wav, AudioFormat::Pcm16];
        assert_eq!(
            SpeechService::resolve_format(Some(AudioFormat::Pcm16), &supported),
            AudioFormat::Pcm16
        );
        // Unsupported request falls back to the engine's first format.
        assert_eq!(
            SpeechService::resolve_format(Some(AudioFormat::Mp3), &supported),
            AudioFormat::Wav
        );
        assert_eq!(
            SpeechService::resolve_format(None, &supported),
            AudioFormat::Wav
        );
    }
}
