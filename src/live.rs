//! Live capture loop: microphone to transcription without a network client.
//!
//! Capture is phrase-oriented rather than chunk-oriented. The loop calibrates
//! an ambient noise floor, waits for the signal to rise above it, accumulates
//! until a silence gap or the phrase cap, then dispatches the whole phrase as
//! one unit through the same dispatcher the server sessions use.

use crate::audio::decode::rms_level;
use crate::audio::source::AudioSource;
use crate::config::{CaptureConfig, Config};
use crate::error::{Result, ScribeError};
use crate::session::dispatcher::{DispatchUpdate, Dispatcher};
use crate::session::window::AudioWindow;
use crate::stt::transcriber::Transcriber;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How long to wait when the device has no new samples.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Calibration headroom: speech must rise this far above the noise floor.
const CALIBRATION_FACTOR: f32 = 1.5;

/// Tunables for the capture loop, lifted out of the config tree.
#[derive(Debug, Clone, Copy)]
pub struct LiveSettings {
    pub calibration_ms: u32,
    pub phrase_timeout_ms: u32,
    pub max_phrase_ms: u32,
    pub phrase_gap_ms: u32,
    pub speech_threshold: f32,
    pub queue_depth: usize,
}

impl LiveSettings {
    pub fn from_config(config: &Config) -> Self {
        Self::from_capture(&config.capture, config.audio.dispatch_queue_depth)
    }

    pub fn from_capture(capture: &CaptureConfig, queue_depth: usize) -> Self {
        Self {
            calibration_ms: capture.calibration_ms,
            phrase_timeout_ms: capture.phrase_timeout_ms,
            max_phrase_ms: capture.max_phrase_ms,
            phrase_gap_ms: capture.phrase_gap_ms,
            speech_threshold: capture.speech_threshold,
            queue_depth,
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::from_capture(
            &CaptureConfig::default(),
            crate::defaults::DISPATCH_QUEUE_DEPTH,
        )
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as usize * sample_rate as usize) / 1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    /// No speech yet; tracking how long we have been waiting.
    Waiting { quiet_samples: usize },
    /// Inside a phrase; tracking the trailing silence run.
    Speaking { silence_samples: usize },
}

/// Turns a stream of sample batches into whole phrases.
///
/// Time is measured in samples, not wall clock, so detection is deterministic
/// for a given input stream. A phrase starts when a batch's RMS level crosses
/// the threshold and ends at a silence gap or the phrase cap.
pub struct PhraseDetector {
    threshold: f32,
    timeout_samples: usize,
    max_samples: usize,
    gap_samples: usize,
    window: AudioWindow,
    state: DetectorState,
}

impl PhraseDetector {
    pub fn new(threshold: f32, sample_rate: u32, settings: &LiveSettings) -> Self {
        Self {
            threshold,
            timeout_samples: ms_to_samples(settings.phrase_timeout_ms, sample_rate),
            max_samples: ms_to_samples(settings.max_phrase_ms, sample_rate),
            gap_samples: ms_to_samples(settings.phrase_gap_ms, sample_rate),
            window: AudioWindow::new(),
            state: DetectorState::Waiting { quiet_samples: 0 },
        }
    }

    /// The speech threshold in effect, after calibration.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed one batch of samples; returns a complete phrase when one ends.
    pub fn push(&mut self, batch: &[i16]) -> Option<Vec<i16>> {
        if batch.is_empty() {
            return None;
        }
        let level = rms_level(batch);

        match self.state {
            DetectorState::Waiting { quiet_samples } => {
                if level >= self.threshold {
                    self.window.append(batch);
                    self.state = DetectorState::Speaking { silence_samples: 0 };
                } else {
                    // Waiting for speech is not an error; the timeout just
                    // restarts the wait.
                    let quiet = quiet_samples + batch.len();
                    self.state = DetectorState::Waiting {
                        quiet_samples: if quiet >= self.timeout_samples { 0 } else { quiet },
                    };
                }
                None
            }
            DetectorState::Speaking { silence_samples } => {
                self.window.append(batch);
                let silence = if level < self.threshold {
                    silence_samples + batch.len()
                } else {
                    0
                };

                if silence >= self.gap_samples || self.window.len() >= self.max_samples {
                    self.state = DetectorState::Waiting { quiet_samples: 0 };
                    Some(self.window.drain())
                } else {
                    self.state = DetectorState::Speaking {
                        silence_samples: silence,
                    };
                    None
                }
            }
        }
    }

    /// Take any phrase still in progress, e.g. when capture stops mid-word.
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        self.state = DetectorState::Waiting { quiet_samples: 0 };
        if self.window.is_empty() {
            None
        } else {
            Some(self.window.drain())
        }
    }
}

/// Run the capture loop until `stop` fires or the device fails.
///
/// Dispatch completions are forwarded to `updates_tx` in phrase order. On
/// stop, a phrase in progress is flushed and its result still delivered
/// before the function returns. A device failure mid-capture is fatal.
pub async fn run_live<S: AudioSource>(
    mut source: S,
    transcriber: Arc<dyn Transcriber>,
    settings: LiveSettings,
    updates_tx: mpsc::Sender<DispatchUpdate>,
    stop: watch::Receiver<bool>,
    quiet: bool,
) -> Result<()> {
    source.start()?;
    let sample_rate = source.sample_rate();

    let threshold = match calibrate(&mut source, &settings, sample_rate, &stop).await {
        Ok(Some(threshold)) => threshold,
        Ok(None) => {
            // Stopped during calibration
            let _ = source.stop();
            return Ok(());
        }
        Err(e) => {
            let _ = source.stop();
            return Err(e);
        }
    };
    if !quiet {
        eprintln!(
            "streamscribe: calibrated, speech threshold {:.4} (floor {:.4})",
            threshold,
            threshold / CALIBRATION_FACTOR
        );
    }

    let mut detector = PhraseDetector::new(threshold, sample_rate, &settings);
    let (mut dispatcher, mut updates) = Dispatcher::spawn(transcriber, settings.queue_depth);

    let forwarder = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if updates_tx.send(update).await.is_err() {
                return;
            }
        }
    });

    let outcome = loop {
        if *stop.borrow() {
            break Ok(());
        }

        let batch = match source.read_samples() {
            Ok(batch) => batch,
            Err(e) => break Err(e),
        };

        if batch.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        if let Some(phrase) = detector.push(&batch) {
            match dispatcher.dispatch(phrase) {
                Ok(_) => {}
                Err(ScribeError::BackendBusy) => {
                    eprintln!("streamscribe: backend busy, phrase dropped");
                }
                Err(e) => break Err(e),
            }
        }
    };

    let _ = source.stop();
    if let Some(tail) = detector.flush() {
        // Waits for queue space; a phrase cut off by stop is still delivered
        let _ = dispatcher.flush(tail).await;
    }
    dispatcher.finish().await;
    let _ = forwarder.await;

    outcome
}

/// Sample ambient noise and derive the speech threshold.
///
/// Returns `None` if stop was requested before calibration finished. The
/// configured floor is a minimum; a noisy room only raises the threshold.
async fn calibrate<S: AudioSource>(
    source: &mut S,
    settings: &LiveSettings,
    sample_rate: u32,
    stop: &watch::Receiver<bool>,
) -> Result<Option<f32>> {
    let needed = ms_to_samples(settings.calibration_ms, sample_rate);
    let mut ambient: Vec<i16> = Vec::with_capacity(needed);

    while ambient.len() < needed {
        if *stop.borrow() {
            return Ok(None);
        }
        let batch = source.read_samples()?;
        if batch.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }
        ambient.extend_from_slice(&batch);
    }

    let floor = rms_level(&ambient);
    Ok(Some((floor * CALIBRATION_FACTOR).max(settings.speech_threshold)))
}
