use crate::error::{Result, ScribeError};
use std::sync::Arc;

/// One recognized span of speech returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Recognized text for this span.
    pub text: String,
}

impl Segment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real Whisper vs mock).
/// Implementations apply their own voice-activity filtering: silence in,
/// empty segment list out.
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to text segments.
    ///
    /// # Arguments
    /// * `audio` - Audio samples as 16-bit PCM at 16kHz mono
    ///
    /// # Returns
    /// Recognized segments in utterance order. An empty list means no speech
    /// was detected, which is success, not an error.
    fn transcribe(&self, audio: &[i16]) -> Result<Vec<Segment>>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16]) -> Result<Vec<Segment>> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Join segment texts into one result string.
///
/// Segments are trimmed and joined with single spaces in backend order;
/// whitespace-only segments contribute nothing.
pub fn join_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    segments: Vec<Segment>,
    should_fail: bool,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            segments: vec![Segment::new("mock transcription")],
            should_fail: false,
        }
    }

    /// Configure the mock to return a single segment with this text
    pub fn with_response(mut self, response: &str) -> Self {
        self.segments = vec![Segment::new(response)];
        self
    }

    /// Configure the mock to return these segments
    pub fn with_segments(mut self, texts: &[&str]) -> Self {
        self.segments = texts.iter().map(|t| Segment::new(*t)).collect();
        self
    }

    /// Configure the mock to return no segments (silence)
    pub fn with_silence(mut self) -> Self {
        self.segments = Vec::new();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<Vec<Segment>> {
        if self.should_fail {
            Err(ScribeError::BackendUnavailable {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.segments.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
