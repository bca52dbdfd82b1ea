//! Command-line interface for streamscribe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streaming speech-to-text server
#[derive(Parser, Debug)]
#[command(
    name = "streamscribe",
    version,
    about = "Streaming speech-to-text over WebSocket"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: per-session events, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the Whisper model file (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Language code for transcription. Examples: auto, en, de, es, fr
    #[arg(long, global = true, value_name = "LANG")]
    pub language: Option<String>,

    /// Address to bind the WebSocket listener to (overrides config)
    #[arg(long, global = true, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the WebSocket transcription server (default)
    Serve,

    /// List available audio input devices
    Devices,

    /// Capture from the microphone and print transcriptions to stdout
    Listen {
        /// Audio input device name (default: best available)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,
    },

    /// Check the runtime setup (model file, audio, acceleration)
    Check,
}
