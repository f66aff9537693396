//! Speech-synthesis engines
//!
//! One adapter per backend, all implementing the [`SpeechEngine`] capability
//! contract, plus the registry that instantiates and caches them.

mod base;
pub mod credentials;
mod elevenlabs;
mod espeak;
mod openai;
mod piper;
mod polly;
mod registry;

pub use base::{
    AudioFormat, CredentialMap, EngineError, EngineHandle, EngineResult, EngineStatus,
    EngineVoice, SpeechEngine, StatusCell, SynthesisRequest, SynthesisResult, pcm16_duration_ms,
};
pub use credentials::{CredentialField, credential_fields, missing_required, requires_credentials};
pub use elevenlabs::{ELEVENLABS_API_URL, ElevenLabsEngine};
pub use espeak::EspeakEngine;
pub use openai::{OPENAI_TTS_URL, OpenAiEngine};
pub use piper::PiperEngine;
pub use polly::PollyEngine;
pub use registry::EngineRegistry;

use serde::{Deserialize, Serialize};

/// Identity of a synthesis backend.
///
/// The declaration order is load-bearing: bare voice ids are resolved by
/// scanning engines in exactly this order, so the first engine here that
/// knows a bare id wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Elevenlabs,
    OpenAi,
    Polly,
    Espeak,
    Piper,
}

impl EngineKind {
    /// All engines in resolution-precedence order
    pub const ALL: [EngineKind; 5] = [
        EngineKind::Elevenlabs,
        EngineKind::OpenAi,
        EngineKind::Polly,
        EngineKind::Espeak,
        EngineKind::Piper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elevenlabs => "elevenlabs",
            Self::OpenAi => "openai",
            Self::Polly => "polly",
            Self::Espeak => "espeak",
            Self::Piper => "piper",
        }
    }

    /// Parse a client-supplied engine name, accepting common aliases
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "elevenlabs" | "eleven-labs" | "eleven_labs" | "11labs" => Some(Self::Elevenlabs),
            "openai" | "open-ai" | "open_ai" => Some(Self::OpenAi),
            "polly" | "aws-polly" | "aws_polly" | "amazon-polly" => Some(Self::Polly),
            "espeak" | "espeak-ng" | "espeak_ng" => Some(Self::Espeak),
            "piper" | "piper-tts" | "piper_tts" => Some(Self::Piper),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Factory function to create an engine adapter.
///
/// Initialization may fail (missing binary, bad credentials); the caller
/// stores the failure and keeps the engine selectable for retry — a failing
/// backend is never fatal to the process.
pub async fn create_engine(
    kind: EngineKind,
    credentials: CredentialMap,
) -> EngineResult<EngineHandle> {
    let handle: EngineHandle = match kind {
        EngineKind::Elevenlabs => std::sync::Arc::new(ElevenLabsEngine::new(credentials)?),
        EngineKind::OpenAi => std::sync::Arc::new(OpenAiEngine::new(credentials)?),
        EngineKind::Polly => std::sync::Arc::new(PollyEngine::new(credentials).await?),
        EngineKind::Espeak => std::sync::Arc::new(EspeakEngine::new().await?),
        EngineKind::Piper => std::sync::Arc::new(PiperEngine::new(credentials).await?),
    };
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_aliases() {
        assert_eq!(EngineKind::parse("elevenlabs"), Some(EngineKind::Elevenlabs));
        assert_eq!(EngineKind::parse("11labs"), Some(EngineKind::Elevenlabs));
        assert_eq!(EngineKind::parse("aws-polly"), Some(EngineKind::Polly));
        assert_eq!(EngineKind::parse("ESPEAK-NG"), Some(EngineKind::Espeak));
        assert_eq!(EngineKind::parse("piper"), Some(EngineKind::Piper));
        assert_eq!(EngineKind::parse("unknown"), None);
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&EngineKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let back: EngineKind = serde_json::from_str("\"espeak\"").unwrap();
        assert_eq!(back, EngineKind::Espeak);
    }

    #[test]
    fn test_resolution_order_is_stable() {
        // Bare-id resolution depends on this exact order.
        assert_eq!(
            EngineKind::ALL
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>(),
            vec!["elevenlabs", "openai", "polly", "espeak", "piper"]
        );
    }
}
