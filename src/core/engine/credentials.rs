//! Per-engine credential field tables
//!
//! Each vendor names its credentials differently; these static tables are the
//! single source of truth for which fields an engine needs and how they are
//! labelled in the admin UI. This is inherent domain complexity, kept as
//! data rather than code.

use super::EngineKind;

/// One credential field an engine understands
#[derive(Debug, Clone, Copy)]
pub struct CredentialField {
    /// Key used in the opaque credential map
    pub key: &'static str,
    /// Human-readable label for the admin surface
    pub label: &'static str,
    /// Whether the engine is unusable without this field
    pub required: bool,
    /// Whether the value is a secret (masked in status responses)
    pub secret: bool,
}

const ELEVENLABS_FIELDS: &[CredentialField] = &[CredentialField {
    key: "api_key",
    label: "ElevenLabs API key",
    required: true,
    secret: true,
}];

const OPENAI_FIELDS: &[CredentialField] = &[CredentialField {
    key: "api_key",
    label: "OpenAI API key",
    required: true,
    secret: true,
}];

const POLLY_FIELDS: &[CredentialField] = &[
    CredentialField {
        key: "aws_access_key_id",
        label: "AWS access key ID",
        required: true,
        secret: false,
    },
    CredentialField {
        key: "aws_secret_access_key",
        label: "AWS secret access key",
        required: true,
        secret: true,
    },
    CredentialField {
        key: "aws_region",
        label: "AWS region",
        required: false,
        secret: false,
    },
];

const PIPER_FIELDS: &[CredentialField] = &[
    CredentialField {
        key: "binary_path",
        label: "Piper binary path",
        required: false,
        secret: false,
    },
    CredentialField {
        key: "model_dir",
        label: "Piper voice model directory",
        required: false,
        secret: false,
    },
];

/// Fields an engine understands. Free local engines take no credentials
/// (Piper's paths are configuration, not secrets, and have defaults).
pub fn credential_fields(engine: EngineKind) -> &'static [CredentialField] {
    match engine {
        EngineKind::Elevenlabs => ELEVENLABS_FIELDS,
        EngineKind::OpenAi => OPENAI_FIELDS,
        EngineKind::Polly => POLLY_FIELDS,
        EngineKind::Espeak => &[],
        EngineKind::Piper => PIPER_FIELDS,
    }
}

/// Whether the engine needs any credential at all to be listed as available
pub fn requires_credentials(engine: EngineKind) -> bool {
    credential_fields(engine).iter().any(|f| f.required)
}

/// Required credential keys missing from `credentials`
pub fn missing_required(
    engine: EngineKind,
    credentials: &super::CredentialMap,
) -> Vec<&'static str> {
    credential_fields(engine)
        .iter()
        .filter(|f| f.required)
        .filter(|f| {
            credentials
                .get(f.key)
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
        })
        .map(|f| f.key)
        .collect()
}
