//! eSpeak engine adapter
//!
//! Drives the `espeak` (or `espeak-ng`) command-line synthesizer as a
//! subprocess with `--stdout`, which yields a WAV container on stdout. This
//! is the gateway's always-available free engine: no credentials, works
//! offline wherever the binary is installed.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use super::base::{
    AudioFormat, EngineError, EngineResult, EngineStatus, EngineVoice, SpeechEngine, StatusCell,
    SynthesisRequest, SynthesisResult,
};
use super::EngineKind;
use crate::utils::wav::extract_pcm_from_wav;

/// Non-responsive subprocesses are killed after this long
const SYNTH_TIMEOUT: Duration = Duration::from_secs(30);

/// eSpeak's default speaking rate in words per minute
const DEFAULT_WPM: f64 = 175.0;

const SUPPORTED_FORMATS: &[AudioFormat] = &[AudioFormat::Wav, AudioFormat::Pcm16];

/// espeak voice list line: `Pty Language Age/Gender VoiceName File Other`
static VOICE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d+\s+([\w-]+)\s+([MF-])\s+([\w\-+]+)").expect("invalid espeak voice regex")
});

pub struct EspeakEngine {
    /// `espeak` or `espeak-ng`, whichever responded to `--version`
    binary: Option<String>,
    status: StatusCell,
}

impl EspeakEngine {
    pub async fn new() -> EngineResult<Self> {
        let binary = Self::locate_binary().await;
        if binary.is_none() {
            warn!("espeak binary not found; engine will report unavailable");
        }
        Ok(Self {
            binary,
            status: StatusCell::default(),
        })
    }

    async fn locate_binary() -> Option<String> {
        for candidate in ["espeak-ng", "espeak"] {
            if Command::new(candidate)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false)
            {
                return Some(candidate.to_string());
            }
        }
        None
    }

    fn binary(&self) -> EngineResult<&str> {
        self.binary.as_deref().ok_or_else(|| {
            EngineError::NotAvailable(
                "espeak not found; install espeak or espeak-ng".to_string(),
            )
        })
    }

    /// Build the argument list for one synthesis call
    fn build_args(&self, request: &SynthesisRequest) -> Vec<String> {
        let mut args = vec!["--stdout".to_string(), "-v".to_string(), request.voice_id.clone()];

        // speed multiplier -> words per minute
        let wpm = (DEFAULT_WPM * request.speed.unwrap_or(1.0)).round() as u32;
        args.push("-s".to_string());
        args.push(wpm.clamp(80, 450).to_string());

        // semitone shift -> espeak's 0..99 pitch scale centered on 50
        if let Some(pitch) = request.pitch {
            let value = (50.0 + pitch * 2.5).clamp(0.0, 99.0) as u32;
            args.push("-p".to_string());
            args.push(value.to_string());
        }

        args.push("--".to_string());
        args.push(request.text.clone());
        args
    }

    fn parse_voice_list(output: &str) -> Vec<EngineVoice> {
        let mut voices = Vec::new();
        for line in output.lines().skip(1) {
            if let Some(captures) = VOICE_LINE.captures(line) {
                let language = captures.get(1).map_or("unknown", |m| m.as_str()).to_string();
                let gender = match captures.get(2).map(|m| m.as_str()) {
                    Some("M") => Some("male".to_string()),
                    Some("F") => Some("female".to_string()),
                    _ => None,
                };
                let id = captures.get(3).map_or("unknown", |m| m.as_str()).to_string();

                voices.push(EngineVoice {
                    name: format!("eSpeak {id}"),
                    language_code: language.clone(),
                    language,
                    gender,
                    description: None,
                    id,
                });
            }
        }
        voices
    }
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Espeak
    }

    fn supported_formats(&self) -> &'static [AudioFormat] {
        SUPPORTED_FORMATS
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    async fn voices(&self) -> EngineResult<Vec<EngineVoice>> {
        let binary = self.binary()?;
        let output = Command::new(binary)
            .arg("--voices")
            .output()
            .await
            .map_err(|e| EngineError::VoiceListing(format!("failed to run {binary}: {e}")))?;

        if !output.status.success() {
            let err = EngineError::VoiceListing(format!(
                "{binary} --voices exited with {}",
                output.status
            ));
            self.status.record_error(&err);
            return Err(err);
        }

        let voices = Self::parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        self.status.record_voices(voices.len());
        Ok(voices)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<SynthesisResult> {
        let binary = self.binary()?;
        let args = self.build_args(request);

        debug!(voice = %request.voice_id, text_len = request.text.len(), "espeak synthesis");

        // kill_on_drop guarantees the subprocess dies on timeout and on
        // caller cancellation (dropped future).
        let child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Synthesis(format!("failed to spawn {binary}: {e}")))?;

        let output = tokio::time::timeout(SYNTH_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                let err = EngineError::Timeout(SYNTH_TIMEOUT);
                self.status.record_error(&err);
                err
            })?
            .map_err(|e| EngineError::Synthesis(format!("{binary} failed: {e}")))?;

        if !output.status.success() || output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = EngineError::Synthesis(format!(
                "{binary} exited with {}: {}",
                output.status,
                stderr.trim()
            ));
            self.status.record_error(&err);
            return Err(err);
        }

        let wav = output.stdout;
        let extracted = extract_pcm_from_wav(&wav)
            .map_err(|e| EngineError::Synthesis(format!("unparsable espeak output: {e}")))?;
        let duration_ms = super::base::pcm16_duration_ms(
            extracted.samples.len(),
            extracted.sample_rate,
        );

        self.status.record_ok();
        let character_count = request.text.chars().count();

        match request.format {
            AudioFormat::Pcm16 => Ok(SynthesisResult {
                audio: Bytes::from(extracted.samples),
                format: AudioFormat::Pcm16,
                sample_rate: extracted.sample_rate,
                character_count,
                duration_ms,
            }),
            _ => Ok(SynthesisResult {
                audio: Bytes::from(wav),
                format: AudioFormat::Wav,
                sample_rate: extracted.sample_rate,
                character_count,
                duration_ms,
            }),
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine: EngineKind::Espeak,
            enabled: true,
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
