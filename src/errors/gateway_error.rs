//! Gateway error taxonomy
//!
//! A closed set of domain error kinds, each carrying a stable machine code and
//! an HTTP status for REST mapping. The WebSocket layer reuses [`code`] and
//! [`message`] to build its error frames.
//!
//! [`code`]: GatewayError::code
//! [`message`]: std::fmt::Display

use std::time::Duration;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::engine::EngineKind;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Domain error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    // ─────────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────────
    /// Presented API key does not match any stored key
    #[error("API key not found")]
    KeyNotFound,

    /// Key exists but has been disabled by an admin
    #[error("API key is inactive")]
    KeyInactive,

    /// Key exists but its expiry timestamp has passed
    #[error("API key has expired")]
    KeyExpired,

    /// No credentials presented where authentication is required
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Per-key request limit reached for the current window
    #[error("Rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    // ─────────────────────────────────────────────────────────────────────────
    // Voice / engine resolution
    // ─────────────────────────────────────────────────────────────────────────
    /// Voice identifier did not resolve in any available engine
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    /// Engine exists but is currently disabled or unusable
    #[error("Engine not available: {0}")]
    EngineNotAvailable(EngineKind),

    /// Engine requires credentials that are not configured
    #[error("Missing credentials for engine: {0}")]
    MissingCredentials(EngineKind),

    /// Synthesis failed inside an engine adapter
    #[error("Speech generation failed on engine '{engine}': {reason}")]
    SpeechGenerationFailed { engine: EngineKind, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────
    /// Text rejected before synthesis (empty, control-only, ...)
    #[error("Invalid text: {0}")]
    InvalidText(String),

    /// Text exceeds the configured length ceiling
    #[error("Text too long: {length} characters (maximum {max})")]
    TextTooLong { length: usize, max: usize },

    /// A request field failed range or shape validation
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Infrastructure
    // ─────────────────────────────────────────────────────────────────────────
    /// Server-side configuration problem
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Catch-all for unexpected failures; genericized on the wire
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Stable machine-readable error code, shared by REST bodies and WS frames
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeyNotFound => "API_KEY_NOT_FOUND",
            Self::KeyInactive => "API_KEY_INACTIVE",
            Self::KeyExpired => "API_KEY_EXPIRED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::VoiceNotFound(_) => "VOICE_NOT_FOUND",
            Self::EngineNotAvailable(_) => "ENGINE_NOT_AVAILABLE",
            Self::MissingCredentials(_) => "MISSING_CREDENTIALS",
            Self::SpeechGenerationFailed { .. } => "SPEECH_GENERATION_FAILED",
            Self::InvalidText(_) => "INVALID_TEXT",
            Self::TextTooLong { .. } => "TEXT_TOO_LONG",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used by the REST protocol layer
    pub fn status(&self) -> StatusCode {
        match self {
            Self::KeyNotFound | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::KeyInactive | Self::KeyExpired | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::VoiceNotFound(_) => StatusCode::NOT_FOUND,
            Self::EngineNotAvailable(_) | Self::MissingCredentials(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::InvalidText(_) | Self::TextTooLong { .. } | Self::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::SpeechGenerationFailed { .. }
            | Self::Configuration(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Retry hint for retryable conditions
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Message as sent to the caller.
    ///
    /// Unexpected internal errors are logged with full detail server-side but
    /// genericized on the wire; the request id in the response body allows
    /// correlation with the server log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                code = self.code(),
                error = %self,
                "request failed"
            );
        } else {
            tracing::debug!(request_id = %request_id, code = self.code(), error = %self, "request rejected");
        }

        let mut body = json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
                "request_id": request_id,
            }
        });

        if let Some(retry_after) = self.retry_after() {
            body["error"]["retry_after"] = json!(retry_after.as_secs());
            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }

        (status, Json(body)).into_response()
    }
}
