//! streamscribe - Streaming speech-to-text over WebSocket
//!
//! Clients stream raw PCM audio chunks; the server accumulates them into
//! windows, transcribes with Whisper, and pushes results back in order. A
//! live capture mode transcribes straight from the microphone.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod live;
pub mod server;
pub mod session;
pub mod stt;

// Core traits (source → transcribe → deliver)
pub use audio::source::AudioSource;
pub use stt::transcriber::Transcriber;

// Server surface
pub use server::Server;
pub use server::protocol::{ClientEvent, ServerEvent};
pub use session::{Session, SessionSettings, SessionState};

// Error handling
pub use error::{Result, ScribeError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.2+abc1234"` when git hash is available, `"0.1.2"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
