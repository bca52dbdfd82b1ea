//! JSON event protocol between clients and the server.
//!
//! Control and result events are JSON text frames; audio chunks travel as
//! binary frames (raw little-endian 16-bit PCM) and never appear here.

use serde::{Deserialize, Serialize};

/// Control events sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Flush any buffered audio and finalize the session.
    StopRecording,
}

impl ClientEvent {
    /// Serialize event to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// One ordered transcription result. `text` is never empty.
    Transcription { text: String },
    /// Non-fatal failure notice; the session remains open.
    Error { message: String },
}

impl ServerEvent {
    /// Serialize event to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
