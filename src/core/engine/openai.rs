//! OpenAI TTS engine adapter
//!
//! # API Reference
//!
//! - Endpoint: `POST https://api.openai.com/v1/audio/speech`
//! - Models: tts-1, tts-1-hd, gpt-4o-mini-tts
//! - Voices: fixed set (alloy, ash, coral, echo, fable, onyx, nova, sage, shimmer)
//! - Output: mp3, opus, wav, pcm (24kHz)
//! - Speed: 0.25 to 4.0

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::base::{
    AudioFormat, CredentialMap, EngineError, EngineResult, EngineStatus, EngineVoice,
    SpeechEngine, StatusCell, SynthesisRequest, SynthesisResult, pcm16_duration_ms,
};
use super::EngineKind;

/// OpenAI TTS API endpoint
pub const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI always synthesizes at 24kHz
const OPENAI_SAMPLE_RATE: u32 = 24000;

const SUPPORTED_FORMATS: &[AudioFormat] = &[
    AudioFormat::Mp3,
    AudioFormat::Wav,
    AudioFormat::Pcm16,
    AudioFormat::Ogg,
];

/// The vendor's voice roster is static; there is no listing endpoint.
const OPENAI_VOICES: &[(&str, &str)] = &[
    ("alloy", "Alloy"),
    ("ash", "Ash"),
    ("coral", "Coral"),
    ("echo", "Echo"),
    ("fable", "Fable"),
    ("onyx", "Onyx"),
    ("nova", "Nova"),
    ("sage", "Sage"),
    ("shimmer", "Shimmer"),
];

pub struct OpenAiEngine {
    client: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    status: StatusCell,
}

impl OpenAiEngine {
    pub fn new(credentials: CredentialMap) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;

        let api_key = credentials
            .get("api_key")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let api_url = credentials
            .get("api_base_url")
            .map(|base| format!("{}/v1/audio/speech", base.trim_end_matches('/')))
            .unwrap_or_else(|| OPENAI_TTS_URL.to_string());

        Ok(Self {
            client,
            api_key,
            api_url,
            status: StatusCell::default(),
        })
    }

    fn response_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Pcm16 => "pcm",
            AudioFormat::Ogg => "opus",
        }
    }
}

#[async_trait]
impl SpeechEngine for OpenAiEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::OpenAi
    }

    fn supported_formats(&self) -> &'static [AudioFormat] {
        SUPPORTED_FORMATS
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn voices(&self) -> EngineResult<Vec<EngineVoice>> {
        if self.api_key.is_none() {
            return Err(EngineError::MissingCredentials("api_key".to_string()));
        }

        let voices: Vec<EngineVoice> = OPENAI_VOICES
            .iter()
            .map(|(id, name)| EngineVoice {
                id: (*id).to_string(),
                name: (*name).to_string(),
                language: "multilingual".to_string(),
                language_code: "multi".to_string(),
                gender: None,
                description: Some("OpenAI neural voice".to_string()),
            })
            .collect();

        self.status.record_voices(voices.len());
        Ok(voices)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<SynthesisResult> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::MissingCredentials("api_key".to_string()))?;

        let mut body = json!({
            "model": "tts-1",
            "input": request.text,
            "voice": request.voice_id,
            "response_format": Self::response_format(request.format),
        });

        // Add speed if not default (1.0)
        if let Some(speed) = request.speed {
            if (speed - 1.0).abs() > 0.001 {
                body["speed"] = json!(speed.clamp(0.25, 4.0));
            }
        }

        debug!(
            voice = %request.voice_id,
            format = %request.format,
            text_len = request.text.len(),
            "OpenAI synthesis request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout(REQUEST_TIMEOUT)
                } else {
                    EngineError::Synthesis(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let err = if status == reqwest::StatusCode::UNAUTHORIZED {
                EngineError::MissingCredentials(format!("rejected by OpenAI: {detail}"))
            } else {
                EngineError::Synthesis(format!("OpenAI returned {status}: {detail}"))
            };
            self.status.record_error(&err);
            return Err(err);
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| EngineError::Synthesis(e.to_string()))?;

        self.status.record_ok();
        let duration_ms = match request.format {
            AudioFormat::Pcm16 => pcm16_duration_ms(audio.len(), OPENAI_SAMPLE_RATE),
            _ => None,
        };

        Ok(SynthesisResult {
            character_count: request.text.chars().count(),
            audio,
            format: request.format,
            sample_rate: OPENAI_SAMPLE_RATE,
            duration_ms,
        })
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine: EngineKind::OpenAi,
            enabled: self.api_key.is_some(),
            available: self.is_available(),
            supports_streaming: false,
            supports_ssml: false,
            formats: SUPPORTED_FORMATS.to_vec(),
            voice_count: self.status.voice_count(),
            last_error: self.status.last_error(),
            last_checked_ms: self.status.last_checked_ms(),
        }
    }
}
