//! ElevenLabs engine adapter
//!
//! Talks to the ElevenLabs REST API. The base URL is overridable through the
//! `api_base_url` credential, which also lets tests point the adapter at a
//! mock server.
//!
//! # API Reference
//!
//! - Voices: `GET /v1/voices` (header `xi-api-key`)
//! - Synthesis: `POST /v1/text-to-speech/{voice_id}?output_format=...`
//! - Streaming: `POST /v1/text-to-speech/{voice_id}/stream`

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::base::{
    AudioFormat, CredentialMap, EngineError, EngineResult, EngineStatus, EngineVoice,
    SpeechEngine, StatusCell, SynthesisRequest, SynthesisResult, pcm16_duration_ms,
};
use super::EngineKind;

/// Default ElevenLabs API base URL
pub const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io";

/// Bounded timeout for outbound synthesis calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SUPPORTED_FORMATS: &[AudioFormat] = &[AudioFormat::Mp3, AudioFormat::Pcm16, AudioFormat::Ogg];

/// PCM sample rates the vendor accepts in `output_format`
const PCM_SAMPLE_RATES: &[u32] = &[16000, 22050, 24000, 44100];

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<ApiVoice>,
}

#[derive(Debug, Deserialize)]
struct ApiVoice {
    voice_id: String,
    name: String,
    labels: Option<std::collections::HashMap<String, String>>,
    verified_languages: Option<Vec<ApiLanguage>>,
}

#[derive(Debug, Deserialize)]
struct ApiLanguage {
    language: String,
}

pub struct ElevenLabsEngine {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    status: StatusCell,
}

impl ElevenLabsEngine {
    pub fn new(credentials: CredentialMap) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;

        let api_key = credentials
            .get("api_key")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let base_url = credentials
            .get("api_base_url")
            .cloned()
            .unwrap_or_else(|| ELEVENLABS_API_URL.to_string());

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            status: StatusCell::default(),
        })
    }

    fn api_key(&self) -> EngineResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| EngineError::MissingCredentials("api_key".to_string()))
    }

    /// Map the negotiated container to the vendor's `output_format` name and
    /// the sample rate the response will carry.
    fn output_format(&self, format: AudioFormat, sample_rate: Option<u32>) -> (String, u32) {
        match format {
            AudioFormat::Pcm16 => {
                let rate = sample_rate
                    .filter(|r| PCM_SAMPLE_RATES.contains(r))
                    .unwrap_or(22050);
                (format!("pcm_{rate}"), rate)
            }
            AudioFormat::Ogg => ("opus_48000_64".to_string(), 48000),
            // Mp3 and anything unexpected fall back to the vendor default.
            _ => ("mp3_44100_128".to_string(), 44100),
        }
    }

    fn request_body(&self, request: &SynthesisRequest) -> Value {
        let mut settings = json!({});
        if let Some(stability) = request.stability {
            settings["stability"] = json!(stability);
        }
        if let Some(similarity) = request.similarity {
            settings["similarity_boost"] = json!(similarity);
        }
        if let Some(style) = request.style {
            settings["style"] = json!(style);
        }
        if let Some(speed) = request.speed {
            settings["speed"] = json!(speed);
        }

        let mut body = json!({
            "text": request.text,
            "model_id": "eleven_multilingual_v2",
        });
        if settings.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            body["voice_settings"] = settings;
        }
        body
    }

    async fn send_synthesis(
        &self,
        request: &SynthesisRequest,
        stream: bool,
    ) -> EngineResult<(reqwest::Response, u32)> {
        let api_key = self.api_key()?;
        let (output_format, sample_rate) = self.output_format(request.format, request.sample_rate);
        let suffix = if stream { "/stream" } else { "" };
        let url = format!(
            "{}/v1/text-to-speech/{}{}",
            self.base_url, request.voice_id, suffix
        );

        debug!(
            voice = %request.voice_id,
            output_format = %output_format,
            text_len = request.text.len(),
            "ElevenLabs synthesis request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("output_format", output_format.as_str())])
            .header("xi-api-key", api_key)
            .json(&self.request_body(request))
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
                EngineError::MissingCredentials(format!("rejected by ElevenLabs: {detail}"))
            } else {
                EngineError::Synthesis(format!("ElevenLabs returned {status}: {detail}"))
            };
            self.status.record_error(&err);
            return Err(err);
        }

        Ok((response, sample_rate))
    }
}

#[async_trait]
impl SpeechEngine for ElevenLabsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Elevenlabs
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &'static [AudioFormat] {
        SUPPORTED_FORMATS
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn voices(&self) -> EngineResult<Vec<EngineVoice>> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1/voices", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("xi-api-key", api_key)
            .send()
            .await
            .map_err(|e| EngineError::VoiceListing(e.to_string()))?;

        if !response.status().is_success() {
            let err = EngineError::VoiceListing(format!(
                "ElevenLabs returned {}",
                response.status()
            ));
            self.status.record_error(&err);
            return Err(err);
        }

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| EngineError::VoiceListing(e.to_string()))?;

        let voices: Vec<EngineVoice> = parsed
            .voices
            .into_iter()
            .map(|v| {
                let language = v
                    .verified_languages
                    .as_ref()
                    .and_then(|l| l.first())
                    .map(|l| l.language.clone())
                    .unwrap_or_else(|| "en".to_string());
                let gender = v.labels.as_ref().and_then(|l| l.get("gender").cloned());
                let description = v.labels.as_ref().and_then(|l| l.get("accent").cloned());
                EngineVoice {
                    id: v.voice_id,
                    name: v.name,
                    language_code: language.clone(),
                    language,
                    gender,
                    description,
                }
            })
            .collect();

        self.status.record_voices(voices.len());
        Ok(voices)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<SynthesisResult> {
        let (response, sample_rate) = self.send_synthesis(request, false).await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| EngineError::Synthesis(e.to_string()))?;

        self.status.record_ok();
        let duration_ms = match request.format {
            AudioFormat::Pcm16 => pcm16_duration_ms(audio.len(), sample_rate),
            _ => None,
        };

        Ok(SynthesisResult {
            character_count: request.text.chars().count(),
            audio,
            format: request.format,
            sample_rate,
            duration_ms,
        })
    }

    async fn synthesize_stream(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::Sender<Bytes>,
    ) -> EngineResult<SynthesisResult> {
        let (response, sample_rate) = self.send_synthesis(request, true).await?;

        let mut stream = response.bytes_stream();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| EngineError::Synthesis(e.to_string()))?;
            collected.extend_from_slice(&chunk);
            if chunks.send(chunk).await.is_err() {
                // Receiver dropped mid-stream: the caller went away, stop
                // pulling from upstream.
                warn!("ElevenLabs stream receiver dropped, aborting synthesis");
                break;
            }
        }

        self.status.record_ok();
        let audio = Bytes::from(collected);
        let duration_ms = match request.format {
            AudioFormat::Pcm16 => pcm16_duration_ms(audio.len(), sample_rate),
            _ => None,
        };

        Ok(SynthesisResult {
            character_count: request.text.chars().count(),
            audio,
            format: request.format,
            sample_rate,
            duration_ms,
        })
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine: EngineKind::Elevenlabs,
            enabled: self.api_key.is_some(),
            available: self.is_available(),
            supports_streaming: true,
            supports_ssml: false,
            formats: SUPPORTED_FORMATS.to_vec(),
            voice_count: self.status.voice_count(),
            last_error: self.status.last_error(),
            last_checked_ms: self.status.last_checked_ms(),
        }
    }
}
