pub mod engine;
pub mod speech;
pub mod voice;

pub use engine::{AudioFormat, EngineKind, EngineRegistry};
pub use speech::{SpeakRequest, SpeechOutcome, SpeechService};
pub use voice::{Voice, VoiceCatalog};
