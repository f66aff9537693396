//! Piper engine adapter
//!
//! Piper is a local neural synthesizer driven as a subprocess: one ONNX model
//! per voice, text on stdin, raw 16-bit PCM on stdout (`--output-raw`). The
//! voice catalog is the set of `*.onnx` models found in the configured model
//! directory; each model's sidecar JSON declares its sample rate.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::base::{
    AudioFormat, CredentialMap, EngineError, EngineResult, EngineStatus, EngineVoice,
    SpeechEngine, StatusCell, SynthesisRequest, SynthesisResult, pcm16_duration_ms,
};
use super::EngineKind;
use crate::utils::wav::wrap_pcm_in_wav;

const SYNTH_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_SAMPLE_RATE: u32 = 22050;

const SUPPORTED_FORMATS: &[AudioFormat] = &[AudioFormat::Pcm16, AudioFormat::Wav];

pub struct PiperEngine {
    binary: PathBuf,
    model_dir: PathBuf,
    binary_available: bool,
    status: StatusCell,
}

impl PiperEngine {
    pub async fn new(credentials: CredentialMap) -> EngineResult<Self> {
        let binary = PathBuf::from(
            credentials
                .get("binary_path")
                .cloned()
                .unwrap_or_else(|| "piper".to_string()),
        );
        let model_dir = PathBuf::from(
            credentials
                .get("model_dir")
                .cloned()
                .unwrap_or_else(|| "/usr/share/piper-voices".to_string()),
        );

        let binary_available = Command::new(&binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);

        if !binary_available {
            warn!(binary = %binary.display(), "piper binary not found; engine will report unavailable");
        }

        Ok(Self {
            binary,
            model_dir,
            binary_available,
            status: StatusCell::default(),
        })
    }

    fn model_path(&self, voice_id: &str) -> EngineResult<PathBuf> {
        // Voice ids are model file stems; reject anything path-like so a
        // crafted id cannot escape the model directory.
        if voice_id.contains('/') || voice_id.contains('\\') || voice_id.contains("..") {
            return Err(EngineError::InvalidConfiguration(format!(
                "invalid piper voice id: {voice_id}"
            )));
        }
        Ok(self.model_dir.join(format!("{voice_id}.onnx")))
    }

    /// Sample rate from the model's sidecar JSON, falling back to Piper's
    /// default when the sidecar is missing or unparsable.
    async fn model_sample_rate(&self, model_path: &Path) -> u32 {
        let sidecar = model_path.with_extension("onnx.json");
        match tokio::fs::read(&sidecar).await {
            Ok(raw) => serde_json::from_slice::<serde_json::Value>(&raw)
                .ok()
                .and_then(|v| v["audio"]["sample_rate"].as_u64())
                .map(|r| r as u32)
                .unwrap_or(DEFAULT_SAMPLE_RATE),
            Err(_) => DEFAULT_SAMPLE_RATE,
        }
    }

    /// Language code from a Piper model name like `en_US-lessac-medium`
    fn language_of(voice_id: &str) -> String {
        voice_id
            .split('-')
            .next()
            .unwrap_or("unknown")
            .to_string()
    }
}

#[async_trait]
impl SpeechEngine for PiperEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Piper
    }

    fn supported_formats(&self) -> &'static [AudioFormat] {
        SUPPORTED_FORMATS
    }

    fn is_available(&self) -> bool {
        self.binary_available
    }

    async fn voices(&self) -> EngineResult<Vec<EngineVoice>> {
        if !self.binary_available {
            return Err(EngineError::NotAvailable(format!(
                "piper binary not found at {}",
                self.binary.display()
            )));
        }

        let mut entries = tokio::fs::read_dir(&self.model_dir).await.map_err(|e| {
            EngineError::VoiceListing(format!(
                "cannot read model directory {}: {e}",
                self.model_dir.display()
            ))
        })?;

        let mut voices = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let language = Self::language_of(stem);
            voices.push(EngineVoice {
                id: stem.to_string(),
                name: format!("Piper {stem}"),
                language_code: language.clone(),
                language,
                gender: None,
                description: Some("Piper neural voice".to_string()),
            });
        }

        voices.sort_by(|a, b| a.id.cmp(&b.id));
        self.status.record_voices(voices.len());
        Ok(voices)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> EngineResult<SynthesisResult> {
        if !self.binary_available {
            return Err(EngineError::NotAvailable(format!(
                "piper binary not found at {}",
                self.binary.display()
            )));
        }

        let model_path = self.model_path(&request.voice_id)?;
        if !model_path.exists() {
            return Err(EngineError::Synthesis(format!(
                "piper model not found: {}",
                model_path.display()
            )));
        }
        let sample_rate = self.model_sample_rate(&model_path).await;

        debug!(voice = %request.voice_id, text_len = request.text.len(), "piper synthesis");

        let mut command = Command::new(&self.binary);
        command
            .arg("--model")
            .arg(&model_path)
            .arg("--output-raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // length_scale is the inverse of speaking speed
        if let Some(speed) = request.speed {
            let length_scale = (1.0 / speed.clamp(0.25, 4.0)).clamp(0.25, 4.0);
            command.arg("--length-scale").arg(format!("{length_scale:.3}"));
        }

        let mut child = command
            .spawn()
            .map_err(|e| EngineError::Synthesis(format!("failed to spawn piper: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Synthesis("piper stdin unavailable".to_string()))?;
        let text = request.text.clone();

        let output = tokio::time::timeout(SYNTH_TIMEOUT, async move {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            drop(stdin);
            child.wait_with_output().await
        })
        .await
        .map_err(|_| {
            let err = EngineError::Timeout(SYNTH_TIMEOUT);
            self.status.record_error(&err);
            err
        })?
        .map_err(|e| EngineError::Synthesis(format!("piper failed: {e}")))?;

        if !output.status.success() || output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = EngineError::Synthesis(format!(
                "piper exited with {}: {}",
                output.status,
                stderr.trim()
            ));
            self.status.record_error(&err);
            return Err(err);
        }

        self.status.record_ok();
        let pcm = output.stdout;
        let duration_ms = pcm16_duration_ms(pcm.len(), sample_rate);
        let character_count = request.text.chars().count();

        match request.format {
            AudioFormat::Wav => {
                let wav = wrap_pcm_in_wav(&pcm, sample_rate)
                    .map_err(|e| EngineError::Synthesis(format!("WAV wrapping failed: {e}")))?;
                Ok(SynthesisResult {
                    audio: Bytes::from(wav),
                    format: AudioFormat::Wav,
                    sample_rate,
                    character_count,
                    duration_ms,
                })
            }
            _ => Ok(SynthesisResult {
                audio: Bytes::from(pcm),
                format: AudioFormat::Pcm16,
                sample_rate,
                character_count,
                duration_ms,
            }),
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine: EngineKind::Piper,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine(model_dir: PathBuf) -> PiperEngine {
        PiperEngine {
            binary: PathBuf::from("piper"),
            model_dir,
            binary_available: true,
            status: StatusCell::default(),
        }
    }

    #[test]
    fn test_language_from_model_name() {
        assert_eq!(PiperEngine::language_of("en_US-lessac-medium"), "en_US");
        assert_eq!(PiperEngine::language_of("de_DE-thorsten-high"), "de_DE");
        assert_eq!(PiperEngine::language_of("nomodel"), "nomodel");
    }

    #[test]
    fn test_voice_id_path_traversal_is_rejected() {
        let engine = test_engine(PathBuf::from("/models"));
        assert!(engine.model_path("../../etc/passwd").is_err());
        assert!(engine.model_path("en/US").is_err());
        assert!(engine.model_path("en_US-lessac-medium").is_ok());
    }

    #[tokio::test]
    async fn test_voices_scans_model_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en_US-lessac-medium.onnx"), b"model").unwrap();
        std::fs::write(dir.path().join("de_DE-thorsten-high.onnx"), b"model").unwrap();
        std::fs::write(dir.path().join("README.md"), b"not a model").unwrap();

        let engine = test_engine(dir.path().to_path_buf());
        let voices = engine.voices().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].id, "de_DE-thorsten-high");
        assert_eq!(voices[1].language, "en_US");
    }

    #[tokio::test]
    async fn test_sidecar_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"model").unwrap();
        std::fs::write(
            dir.path().join("voice.onnx.json"),
            br#"{"audio": {"sample_rate": 16000}}"#,
        )
        .unwrap();

        let engine = test_engine(dir.path().to_path_buf());
        assert_eq!(engine.model_sample_rate(&model).await, 16000);

        // Missing sidecar falls back to the default.
        let other = dir.path().join("other.onnx");
        assert_eq!(engine.model_sample_rate(&other).await, DEFAULT_SAMPLE_RATE);
    }
}
