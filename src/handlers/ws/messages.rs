//! WebSocket wire messages
//!
//! Clients send JSON command frames; the server answers with JSON frames and
//! raw binary audio frames. A `speak` command always produces exactly one
//! `meta` frame, then the audio as one or more binary frames, then one `end`
//! frame.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Command frames accepted while the connection is ready
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    Speak {
        text: String,
        voice: String,
        #[serde(default)]
        engine: Option<String>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        sample_rate: Option<u32>,
        #[serde(default)]
        speed: Option<f64>,
        #[serde(default)]
        pitch: Option<f64>,
        /// Slice the audio into `chunk_size`-byte binary frames
        #[serde(default)]
        stream: Option<bool>,
        #[serde(default)]
        chunk_size: Option<usize>,
    },
    Voices,
    Engines,
}

/// JSON frames sent by the server
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Meta {
        format: String,
        sample_rate: u32,
        engine: String,
        voice: String,
        bytes: usize,
        chunks: usize,
    },
    End {
        bytes: usize,
        chunks: usize,
    },
    Voices {
        voices: Vec<serde_json::Value>,
    },
    Engines {
        engines: Vec<serde_json::Value>,
    },
}

/// Error frames use a flat shape, distinct from the REST envelope
#[derive(Debug, Serialize)]
pub struct ErrorFrame {
    pub error: String,
    pub code: &'static str,
}

/// Routes from command processing to the single socket writer task
#[derive(Debug)]
pub enum MessageRoute {
    Frame(ServerFrame),
    Error(ErrorFrame),
    Binary(Bytes),
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speak_command_parses() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"speak","text":"hi","voice":"espeak:en","stream":true,"chunk_size":100}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::Speak {
                text,
                voice,
                stream,
                chunk_size,
                ..
            } => {
                assert_eq!(text, "hi");
                assert_eq!(voice, "espeak:en");
                assert_eq!(stream, Some(true));
                assert_eq!(chunk_size, Some(100));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_bare_commands_parse() {
        assert!(matches!(
            serde_json::from_str::<ClientCommand>(r#"{"type":"voices"}"#).unwrap(),
            ClientCommand::Voices
        ));
        assert!(matches!(
            serde_json::from_str::<ClientCommand>(r#"{"type":"engines"}"#).unwrap(),
            ClientCommand::Engines
        ));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_meta_frame_shape() {
        let frame = ServerFrame::Meta {
            format: "pcm16".to_string(),
            sample_rate: 22050,
            engine: "espeak".to_string(),
            voice: "espeak:en".to_string(),
            bytes: 1000,
            chunks: 10,
        };
        let value: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "meta");
        assert_eq!(value["bytes"], 1000);
        assert_eq!(value["chunks"], 10);
    }
}
