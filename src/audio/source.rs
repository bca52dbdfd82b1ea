use crate::defaults;
use crate::error::{Result, ScribeError};

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real capture device vs mock).
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Drain the samples captured since the last read.
    ///
    /// Returns an empty vector when nothing new has arrived; a `Result::Err`
    /// means the device itself failed.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Sample rate the source delivers, in Hz.
    fn sample_rate(&self) -> u32 {
        defaults::SAMPLE_RATE
    }
}

/// Mock audio source for testing the capture loop.
///
/// Serves a scripted sequence of reads, then empty reads forever (or a
/// configured failure).
#[derive(Debug, Clone, Default)]
pub struct MockAudioSource {
    is_started: bool,
    reads: Vec<Vec<i16>>,
    next_read: usize,
    fail_start: bool,
    fail_after_reads: Option<usize>,
}

impl MockAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the sequence of sample batches returned by `read_samples`.
    pub fn with_reads(mut self, reads: Vec<Vec<i16>>) -> Self {
        self.reads = reads;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Configure the mock to fail with `DeviceUnavailable` after the scripted
    /// reads are exhausted plus `n` extra reads.
    pub fn with_device_failure_after(mut self, n: usize) -> Self {
        self.fail_after_reads = Some(n);
        self
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(ScribeError::DeviceUnavailable {
                message: "mock start failure".to_string(),
            });
        }
        self.is_started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if !self.is_started {
            return Err(ScribeError::AudioCapture {
                message: "source not started".to_string(),
            });
        }

        if self.next_read < self.reads.len() {
            let batch = self.reads[self.next_read].clone();
            self.next_read += 1;
            return Ok(batch);
        }

        if let Some(extra) = self.fail_after_reads {
            let past_end = self.next_read - self.reads.len();
            if past_end >= extra {
                return Err(ScribeError::DeviceUnavailable {
                    message: "mock device disappeared".to_string(),
                });
            }
        }

        self.next_read += 1;
        Ok(Vec::new())
    }
}
