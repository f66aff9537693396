//! Shared utilities

pub mod text;
pub mod wav;

pub use text::normalize_text;
pub use wav::{ExtractedPcm, extract_pcm_from_wav, wrap_pcm_in_wav};

/// Milliseconds since the Unix epoch. Wall-clock timestamps are stored as
/// plain integers so they serialize cheaply in JSON payloads.
pub fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
