//! Per-session audio accumulation.
//!
//! An `AudioWindow` buffers decoded samples until a dispatch condition is
//! met, then drains atomically. One window belongs to exactly one session
//! (or to the live capture loop); there is no shared buffer between clients.

use crate::defaults;

/// Condition that triggers a dispatch of accumulated audio.
///
/// Either form is a buffering policy, not utterance detection: a chunk count
/// proxies duration when clients send fixed-size chunks, a sample count
/// proxies it exactly. Explicit flush dispatches regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchThreshold {
    /// Dispatch once this many chunks have been appended.
    Chunks(u32),
    /// Dispatch once this many samples have accumulated.
    Samples(usize),
}

impl Default for DispatchThreshold {
    fn default() -> Self {
        DispatchThreshold::Chunks(defaults::DISPATCH_THRESHOLD_CHUNKS)
    }
}

/// Accumulated, not-yet-dispatched samples for one session.
#[derive(Debug, Default)]
pub struct AudioWindow {
    samples: Vec<i16>,
    chunk_count: u32,
}

impl AudioWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decoded chunk's samples.
    pub fn append(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
        self.chunk_count += 1;
    }

    /// Number of accumulated samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of chunks appended since the last drain.
    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Whether the accumulated audio meets the dispatch threshold.
    pub fn should_dispatch(&self, threshold: DispatchThreshold) -> bool {
        match threshold {
            DispatchThreshold::Chunks(n) => self.chunk_count >= n,
            DispatchThreshold::Samples(n) => self.samples.len() >= n,
        }
    }

    /// Atomically take the accumulated samples and reset the window.
    ///
    /// Draining an empty window yields an empty vector; callers skip
    /// dispatch in that case (the backend never sees empty audio).
    pub fn drain(&mut self) -> Vec<i16> {
        self.chunk_count = 0;
        std::mem::take(&mut self.samples)
    }
}
