//! Per-session transcription dispatch.
//!
//! One sequential worker task per session consumes a bounded FIFO queue of
//! drained windows and runs backend inference on the blocking thread pool.
//! Sequential consumption means at most one backend call is in flight per
//! session and results come back in submission order; a full queue rejects
//! the dispatch with `BackendBusy` instead of buffering unbounded audio.

use crate::error::{Result, ScribeError};
use crate::stt::transcriber::{Transcriber, join_segments};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One drained window queued for transcription.
#[derive(Debug)]
struct DispatchJob {
    seq: u64,
    samples: Vec<i16>,
}

/// Completion of one dispatch, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchUpdate {
    /// The backend recognized speech; `text` is never empty.
    Transcribed { seq: u64, text: String },
    /// The backend saw no speech. Success with no client-visible event.
    Silence { seq: u64 },
    /// The dispatch failed. Non-fatal to the session.
    Failed { seq: u64, message: String },
}

impl DispatchUpdate {
    pub fn seq(&self) -> u64 {
        match self {
            DispatchUpdate::Transcribed { seq, .. }
            | DispatchUpdate::Silence { seq }
            | DispatchUpdate::Failed { seq, .. } => *seq,
        }
    }
}

/// Handle for submitting drained windows to a session's dispatch worker.
///
/// Dropping the dispatcher closes the queue; the worker finishes any queued
/// jobs and exits.
pub struct Dispatcher {
    tx: mpsc::Sender<DispatchJob>,
    next_seq: u64,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn a dispatch worker for one session.
    ///
    /// Returns the dispatcher handle and the receiver on which completions
    /// arrive, in submission order.
    pub fn spawn(
        transcriber: Arc<dyn Transcriber>,
        queue_depth: usize,
    ) -> (Self, mpsc::Receiver<DispatchUpdate>) {
        let (job_tx, job_rx) = mpsc::channel::<DispatchJob>(queue_depth);
        let (update_tx, update_rx) = mpsc::channel::<DispatchUpdate>(queue_depth);

        let worker = tokio::spawn(run_worker(transcriber, job_rx, update_tx));

        (
            Self {
                tx: job_tx,
                next_seq: 0,
                worker,
            },
            update_rx,
        )
    }

    /// Queue a drained window for transcription.
    ///
    /// Empty windows are skipped (`Ok(None)`) — the backend never receives
    /// empty audio.
    ///
    /// # Errors
    /// `ScribeError::BackendBusy` when the queue is full;
    /// `ScribeError::SessionClosed` when the worker has already shut down.
    pub fn dispatch(&mut self, samples: Vec<i16>) -> Result<Option<u64>> {
        if samples.is_empty() {
            return Ok(None);
        }

        let seq = self.next_seq;
        match self.tx.try_send(DispatchJob { seq, samples }) {
            Ok(()) => {
                self.next_seq += 1;
                Ok(Some(seq))
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(ScribeError::BackendBusy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ScribeError::SessionClosed),
        }
    }

    /// Queue a drained window, waiting for queue space if necessary.
    ///
    /// Used for the final flush on stop: the session is closing, so blocking
    /// the receive path no longer matters and the flushed audio must not be
    /// lost to a momentarily full queue.
    ///
    /// # Errors
    /// `ScribeError::SessionClosed` when the worker has already shut down.
    pub async fn flush(&mut self, samples: Vec<i16>) -> Result<Option<u64>> {
        if samples.is_empty() {
            return Ok(None);
        }

        let seq = self.next_seq;
        self.tx
            .send(DispatchJob { seq, samples })
            .await
            .map_err(|_| ScribeError::SessionClosed)?;
        self.next_seq += 1;
        Ok(Some(seq))
    }

    /// Number of dispatches submitted so far.
    pub fn submitted(&self) -> u64 {
        self.next_seq
    }

    /// Whether the queue can take another job right now.
    ///
    /// Single-writer per session: only the session's handler enqueues, so a
    /// positive answer cannot be invalidated before the enqueue happens.
    pub fn has_capacity(&self) -> bool {
        self.tx.capacity() > 0
    }

    /// Close the queue and wait for queued work to complete.
    ///
    /// Used on explicit stop so the final flush's result is still produced
    /// before teardown.
    pub async fn finish(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}

/// Sequential dispatch loop: one job at a time, inference on the blocking
/// thread pool, completions forwarded in order.
async fn run_worker(
    transcriber: Arc<dyn Transcriber>,
    mut jobs: mpsc::Receiver<DispatchJob>,
    updates: mpsc::Sender<DispatchUpdate>,
) {
    while let Some(job) = jobs.recv().await {
        let seq = job.seq;
        let samples = job.samples;
        let transcriber = Arc::clone(&transcriber);

        let outcome =
            tokio::task::spawn_blocking(move || transcriber.transcribe(&samples)).await;

        let update = match outcome {
            Ok(Ok(segments)) => {
                let text = join_segments(&segments);
                if text.is_empty() {
                    DispatchUpdate::Silence { seq }
                } else {
                    DispatchUpdate::Transcribed { seq, text }
                }
            }
            Ok(Err(e)) => DispatchUpdate::Failed {
                seq,
                message: e.to_string(),
            },
            Err(e) => DispatchUpdate::Failed {
                seq,
                message: format!("transcription task panicked: {}", e),
            },
        };

        // Receiver gone means the session is tearing down; results for a
        // gone connection are discarded.
        if updates.send(update).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stt::transcriber::{MockTranscriber, Segment};
    use std::time::Duration;

    fn spawn_with(mock: MockTranscriber) -> (Dispatcher, mpsc::Receiver<DispatchUpdate>) {
        Dispatcher::spawn(Arc::new(mock), 4)
    }

    /// Transcriber whose first call blocks until released, so tests can hold
    /// the worker busy and fill the queue behind it.
    pub(crate) struct StallingTranscriber {
        release: std::sync::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl StallingTranscriber {
        pub(crate) fn new() -> (Arc<Self>, std::sync::mpsc::Sender<()>) {
            let (release_tx, release_rx) = std::sync::mpsc::channel();
            (
                Arc::new(Self {
                    release: std::sync::Mutex::new(Some(release_rx)),
                }),
                release_tx,
            )
        }
    }

    impl Transcriber for StallingTranscriber {
        fn transcribe(&self, _audio: &[i16]) -> Result<Vec<Segment>> {
            let rx = self.release.lock().unwrap().take();
            if let Some(rx) = rx {
                let _ = rx.recv_timeout(Duration::from_secs(5));
            }
            Ok(vec![Segment::new("done")])
        }

        fn model_name(&self) -> &str {
            "stalling"
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_dispatch_produces_ordered_transcription() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_response("hello"));

        let seq = dispatcher.dispatch(vec![100i16; 1600]).unwrap();
        assert_eq!(seq, Some(0));

        let update = updates.recv().await.unwrap();
        assert_eq!(
            update,
            DispatchUpdate::Transcribed {
                seq: 0,
                text: "hello".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_window_never_reaches_backend() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_response("never"));

        assert_eq!(dispatcher.dispatch(Vec::new()).unwrap(), None);
        assert_eq!(dispatcher.submitted(), 0);

        dispatcher.finish().await;
        // Queue closed with nothing submitted: no updates at all
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_silence_yields_silence_update_not_event() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_silence());

        dispatcher.dispatch(vec![0i16; 1600]).unwrap();
        assert_eq!(updates.recv().await.unwrap(), DispatchUpdate::Silence { seq: 0 });
    }

    #[tokio::test]
    async fn test_whitespace_segments_count_as_silence() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_segments(&["  ", "\t", ""]));

        dispatcher.dispatch(vec![0i16; 1600]).unwrap();
        assert_eq!(updates.recv().await.unwrap(), DispatchUpdate::Silence { seq: 0 });
    }

    #[tokio::test]
    async fn test_segments_joined_with_single_spaces() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_segments(&[" one", "two ", " three "]));

        dispatcher.dispatch(vec![1i16; 1600]).unwrap();
        match updates.recv().await.unwrap() {
            DispatchUpdate::Transcribed { text, .. } => assert_eq!(text, "one two three"),
            other => panic!("expected Transcribed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_reported_not_fatal() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_failure());

        dispatcher.dispatch(vec![1i16; 1600]).unwrap();
        match updates.recv().await.unwrap() {
            DispatchUpdate::Failed { seq, message } => {
                assert_eq!(seq, 0);
                assert!(message.contains("mock transcription failure"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }

        // The worker survives a failed dispatch
        dispatcher.dispatch(vec![1i16; 1600]).unwrap();
        assert_eq!(updates.recv().await.unwrap().seq(), 1);
    }

    #[tokio::test]
    async fn test_queue_full_rejects_with_backend_busy() {
        let (transcriber, release_tx) = StallingTranscriber::new();
        let (mut dispatcher, mut updates) = Dispatcher::spawn(transcriber, 1);

        // First job gets picked up by the worker and stalls there
        dispatcher.dispatch(vec![1i16; 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Second fills the queue slot
        dispatcher.dispatch(vec![2i16; 100]).unwrap();
        // Third must be rejected
        assert!(matches!(
            dispatcher.dispatch(vec![3i16; 100]),
            Err(ScribeError::BackendBusy)
        ));

        release_tx.send(()).unwrap();
        assert_eq!(updates.recv().await.unwrap().seq(), 0);
        assert_eq!(updates.recv().await.unwrap().seq(), 1);
    }

    #[tokio::test]
    async fn test_flush_waits_for_queue_space() {
        let (transcriber, release_tx) = StallingTranscriber::new();
        let (mut dispatcher, mut updates) = Dispatcher::spawn(transcriber, 1);

        // Worker stalls on the first job; the second occupies the only slot
        dispatcher.dispatch(vec![1i16; 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        dispatcher.dispatch(vec![2i16; 100]).unwrap();
        assert!(matches!(
            dispatcher.dispatch(vec![3i16; 100]),
            Err(ScribeError::BackendBusy)
        ));

        // flush waits out the backlog instead of rejecting
        let (seq, ()) = tokio::join!(dispatcher.flush(vec![3i16; 100]), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            release_tx.send(()).unwrap();
        });
        assert_eq!(seq.unwrap(), Some(2));

        for expected in 0..3 {
            assert_eq!(updates.recv().await.unwrap().seq(), expected);
        }
    }

    #[tokio::test]
    async fn test_results_stay_in_submission_order() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_response("text"));

        for i in 0..4 {
            // Queue depth 4: all fit
            assert_eq!(dispatcher.dispatch(vec![i as i16; 800]).unwrap(), Some(i));
        }

        for expected in 0..4 {
            assert_eq!(updates.recv().await.unwrap().seq(), expected);
        }
    }

    #[tokio::test]
    async fn test_finish_completes_queued_work() {
        let (mut dispatcher, mut updates) =
            spawn_with(MockTranscriber::new("mock").with_response("final words"));

        dispatcher.dispatch(vec![5i16; 1600]).unwrap();
        dispatcher.finish().await;

        // The queued job completed before the worker exited
        match updates.recv().await.unwrap() {
            DispatchUpdate::Transcribed { text, .. } => assert_eq!(text, "final words"),
            other => panic!("expected Transcribed, got {:?}", other),
        }
        assert!(updates.recv().await.is_none());
    }
}
