//! Default configuration constants for streamscribe.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default dispatch threshold in client chunks.
///
/// Two chunks of roughly half a second each give ~1 second of audio per
/// backend call, trading latency against transcription accuracy. This is a
/// buffering policy, not utterance detection — tune per deployment.
pub const DISPATCH_THRESHOLD_CHUNKS: u32 = 2;

/// Default depth of the per-session dispatch queue.
///
/// Dispatches beyond the one in flight wait here; when the queue is full the
/// triggering chunk is rejected with `BackendBusy` instead of buffering
/// unbounded audio behind a slow backend.
pub const DISPATCH_QUEUE_DEPTH: usize = 8;

/// Maximum accepted size of a single inbound audio chunk in bytes.
///
/// Matches 16 seconds of 16kHz 16-bit mono audio. Anything larger is a
/// misbehaving client, not speech.
pub const MAX_CHUNK_BYTES: usize = 512 * 1024;

/// Default language hint for transcription.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Per-segment no-speech probability above which a segment is suppressed.
///
/// Whisper reports how likely each decoded segment is non-speech; filtering
/// on it keeps silence and breathing noise out of client-visible results.
pub const NO_SPEECH_THRESHOLD: f32 = 0.6;

/// Default server bind address.
pub const BIND_ADDR: &str = "127.0.0.1:5001";

/// Default ambient-noise calibration duration in milliseconds.
///
/// The live capture loop samples this much audio once at startup to measure
/// the noise floor before listening for speech.
pub const CALIBRATION_MS: u32 = 1000;

/// Default phrase timeout in milliseconds.
///
/// How long the live capture loop waits for speech to start before giving up
/// and retrying. A timeout is a normal idle cycle, not an error.
pub const PHRASE_TIMEOUT_MS: u32 = 5000;

/// Default maximum phrase duration in milliseconds.
///
/// A phrase still going after this long is cut and dispatched anyway so
/// results keep flowing during continuous speech.
pub const MAX_PHRASE_MS: u32 = 8000;

/// Default silence gap in milliseconds that ends a captured phrase.
pub const PHRASE_GAP_MS: u32 = 800;

/// Default RMS speech threshold for the live capture loop (0.0 to 1.0).
///
/// Calibration raises this above the measured noise floor; the constant is
/// the floor the calibrated value never drops below.
pub const SPEECH_THRESHOLD: f32 = 0.02;

/// Report the GPU backend compiled into this build.
///
/// Returns a human-readable name based on the compile-time feature flags.
/// Only one GPU backend can be active at a time; if none is enabled, returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HipBLAS (AMD)"
    } else if cfg!(feature = "openblas") {
        "OpenBLAS"
    } else {
        "CPU"
    }
}
