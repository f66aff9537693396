//! Amazon Polly engine adapter
//!
//! Uses the AWS SDK for Rust, which handles request signing and retries.
//! Credentials come from the injected credential map when present, otherwise
//! the default AWS credential chain (environment, profile, IAM role).

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_polly::Client as PollyClient;
use aws_sdk_polly::config::Builder as PollyConfigBuilder;
use aws_sdk_polly::types::OutputFormat;
use tracing::debug;

use super::base::{
    AudioFormat, CredentialMap, EngineError, EngineResult, EngineStatus, EngineVoice,
    SpeechEngine, StatusCell, SynthesisRequest, SynthesisResult, pcm16_duration_ms,
};
use super::EngineKind;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SUPPORTED_FORMATS: &[AudioFormat] = &[AudioFormat::Mp3, AudioFormat::Pcm16, AudioFormat::Ogg];

/// Polly PCM output only supports these rates
const PCM_SAMPLE_RATES: &[u32] = &[8000, 16000];

const DEFAULT_REGION: &str = "us-east-1";

pub struct PollyEngine {
    client: PollyClient,
    has_credentials: bool,
    status: StatusCell,
}

impl PollyEngine {
    pub async fn new(credentials: CredentialMap) -> EngineResult<Self> {
        let region = Region::new(
            credentials
                .get("aws_region")
                .cloned()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        );

        let access_key = credentials.get("aws_access_key_id").cloned();
        let secret_key = credentials.get("aws_secret_access_key").cloned();
        let has_explicit = access_key.is_some() && secret_key.is_some();

        let client = if has_explicit {
            let creds = Credentials::new(
                access_key.unwrap_or_default(),
                secret_key.unwrap_or_default(),
                None,
                None,
                "voxgate",
            );
            let polly_config = PollyConfigBuilder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(creds)
                .build();
            PollyClient::from_conf(polly_config)
        } else {
            let aws_config = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            PollyClient::new(&aws_config)
        };

        Ok(Self {
            client,
            has_credentials: has_explicit,
            status: StatusCell::default(),
        })
    }

    fn output_format(format: AudioFormat) -> OutputFormat {
        match format {
            AudioFormat::Pcm16 => OutputFormat::Pcm,
            AudioFormat::Ogg => OutputFormat::OggVorbis,
            // WAV is negotiated away before reaching the adapter.
            _ => OutputFormat::Mp3,
        }
    }

    fn sample_rate_for(format: AudioFormat, requested: Option<u32>) -> u32 {
        match format {
            AudioFormat::Pcm16 => requested
                .filter(|r| PCM_SAMPLE_RATES.contains(r))
                .unwrap_or(16000),
            _ => requested.unwrap_or(22050),
        }
    }
}

#[async_trait]
impl SpeechEngine for PollyEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Polly
    }

    fn supports_ssml(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &'static [AudioFormat] {
        SUPPORTED_FORMATS
    }

    fn is_available(&self) -> bool {
        self.has_credentials
    }

    async fn voices(&self) -> EngineResult<Vec<EngineVoice>> {
        let output = tokio::time::timeout(REQUEST_TIMEOUT, self.client.describe_voices().send())
            .await
            .map_err(|_| EngineError::Timeout(REQUEST_TIMEOUT))?
            .map_err(|e| EngineError::VoiceListing(format!("Polly DescribeVoices: {e}")))?;

        let voices: Vec<EngineVoice> = output
            .voices()
            .iter()
            .filter_map(|v| {
                let id = v.id()?.as_str().to_string();
                Some(EngineVoice {
                    name: v.name().unwrap_or(&id).to_string(),
                    language: v.language_name().unwrap_or("unknown").to_string(),
                    language_code: v
                        .language_code()
                        .map(|c| c.as_str().to_string())
                        .unwrap_or_default(),
                    gender: v.gender().map(|g| g.as_str().to_lowercase()),
                    description: None,
                    id,
                })
            })
            .collect();

        self.status.record_voices(voices.len());
        Ok(voices)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<SynthesisResult> {
        let sample_rate = Self::sample_rate_for(request.format, request.sample_rate);

        debug!(
            voice = %request.voice_id,
            format = %request.format,
            sample_rate,
            "Polly synthesis request"
        );

        let call = self
            .client
            .synthesize_speech()
            .text(&request.text)
            .voice_id(request.voice_id.as_str().into())
            .output_format(Self::output_format(request.format))
            .sample_rate(sample_rate.to_string())
            .send();

        let response = tokio::time::timeout(REQUEST_TIMEOUT, call)
            .await
            .map_err(|_| EngineError::Timeout(REQUEST_TIMEOUT))?
            .map_err(|e| {
                let err = EngineError::Synthesis(format!("Polly SynthesizeSpeech: {e}"));
                self.status.record_error(&err);
                err
            })?;

        let audio = response
            .audio_stream
            .collect()
            .await
            .map_err(|e| EngineError::Synthesis(format!("failed to read audio stream: {e}")))?
            .into_bytes();

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

    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine: EngineKind::Polly,
            enabled: self.has_credentials,
            available: self.is_available(),
            supports_streaming: false,
            supports_ssml: true,
            formats: SUPPORTED_FORMATS.to_vec(),
            voice_count: self.status.voice_count(),
            last_error: self.status.last_error(),
            last_checked_ms: self.status.last_checked_ms(),
        }
    }
}
