//! Session lifecycle: one connected client, one window, one dispatcher.
//!
//! A session moves `Open → Listening → Closed`. Chunk handling is fast and
//! synchronous (decode + append); the long-running backend call happens in
//! the session's dispatch worker so the receive path never blocks.

pub mod dispatcher;
pub mod window;

use crate::audio::decode::decode_chunk;
use crate::defaults;
use crate::error::{Result, ScribeError};
use crate::session::dispatcher::{DispatchUpdate, Dispatcher};
use crate::session::window::{AudioWindow, DispatchThreshold};
use crate::stt::transcriber::Transcriber;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection established, nothing received yet.
    Open,
    /// Receiving chunks.
    Listening,
    /// Terminal. Late chunks are rejected with `SessionClosed`.
    Closed,
}

/// Per-session tunables, derived from configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub threshold: DispatchThreshold,
    pub max_chunk_bytes: usize,
    pub queue_depth: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            threshold: DispatchThreshold::default(),
            max_chunk_bytes: defaults::MAX_CHUNK_BYTES,
            queue_depth: defaults::DISPATCH_QUEUE_DEPTH,
        }
    }
}

/// One client connection's accumulation and dispatch state.
pub struct Session {
    id: u64,
    state: SessionState,
    window: AudioWindow,
    settings: SessionSettings,
    dispatcher: Dispatcher,
}

impl Session {
    /// Open a session against a shared transcriber.
    ///
    /// Returns the session and the receiver on which its dispatch
    /// completions arrive, in accumulation order.
    pub fn open(
        id: u64,
        transcriber: Arc<dyn Transcriber>,
        settings: SessionSettings,
    ) -> (Self, mpsc::Receiver<DispatchUpdate>) {
        let (dispatcher, updates) = Dispatcher::spawn(transcriber, settings.queue_depth);
        (
            Self {
                id,
                state: SessionState::Open,
                window: AudioWindow::new(),
                settings,
                dispatcher,
            },
            updates,
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Samples currently buffered and not yet dispatched.
    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    /// Handle one inbound audio chunk.
    ///
    /// Decodes, appends to the window and, when the dispatch threshold is
    /// met, drains the window into the dispatch queue. Returns the sequence
    /// number of the dispatch this chunk triggered, if any.
    ///
    /// # Errors
    /// `SessionClosed` if the session has been finalized; `MalformedAudio`
    /// for undecodable or oversized chunks (the window keeps its prior
    /// contents and the session stays open); `BackendBusy` if the dispatch
    /// queue is full (the window is left intact, nothing is lost).
    pub fn handle_chunk(&mut self, bytes: &[u8]) -> Result<Option<u64>> {
        if self.state == SessionState::Closed {
            return Err(ScribeError::SessionClosed);
        }
        self.state = SessionState::Listening;

        if bytes.len() > self.settings.max_chunk_bytes {
            return Err(ScribeError::MalformedAudio {
                message: format!(
                    "chunk of {} bytes exceeds limit of {}",
                    bytes.len(),
                    self.settings.max_chunk_bytes
                ),
            });
        }

        let samples = decode_chunk(bytes)?;
        self.window.append(&samples);

        if !self.window.should_dispatch(self.settings.threshold) {
            return Ok(None);
        }

        // Keep accumulating rather than dropping audio when the backend is
        // saturated; the next chunk retries past-threshold.
        if !self.dispatcher.has_capacity() {
            return Err(ScribeError::BackendBusy);
        }

        let drained = self.window.drain();
        self.dispatcher.dispatch(drained)
    }

    /// Explicit stop: flush any remaining audio, then close.
    ///
    /// An empty window produces no final dispatch. A full dispatch queue is
    /// waited out rather than rejected: the session is closing, so the
    /// receive path no longer needs protecting, and the flushed window must
    /// not be lost. Returns the sequence number of the final dispatch, if
    /// one was made.
    pub async fn finish(&mut self) -> Result<Option<u64>> {
        if self.state == SessionState::Closed {
            return Err(ScribeError::SessionClosed);
        }
        self.state = SessionState::Closed;

        let remaining = self.window.drain();
        self.dispatcher.flush(remaining).await
    }

    /// Close the queue and wait for in-flight and queued dispatches.
    ///
    /// Call after `finish` so the final flush's result is still delivered
    /// before the connection tears down.
    pub async fn shutdown(self) {
        self.dispatcher.finish().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::transcriber::MockTranscriber;

    fn chunk_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn open_session(mock: MockTranscriber) -> (Session, mpsc::Receiver<DispatchUpdate>) {
        Session::open(1, Arc::new(mock), SessionSettings::default())
    }

    #[tokio::test]
    async fn test_below_threshold_accumulates_without_dispatch() {
        let (mut session, _updates) = open_session(MockTranscriber::new("mock"));

        let seq = session
            .handle_chunk(&chunk_bytes(&[1, 2, 3]))
            .unwrap();
        assert_eq!(seq, None);
        assert_eq!(session.state(), SessionState::Listening);
        assert_eq!(session.buffered(), 3);
    }

    #[tokio::test]
    async fn test_threshold_of_two_chunks_dispatches_concatenation() {
        let (mut session, mut updates) =
            open_session(MockTranscriber::new("mock").with_response("ab"));

        assert_eq!(session.handle_chunk(&chunk_bytes(&[1, 2])).unwrap(), None);
        let seq = session.handle_chunk(&chunk_bytes(&[3, 4])).unwrap();
        assert_eq!(seq, Some(0));
        // Window was drained atomically with the dispatch
        assert_eq!(session.buffered(), 0);

        assert_eq!(updates.recv().await.unwrap().seq(), 0);
    }

    #[tokio::test]
    async fn test_malformed_chunk_keeps_session_usable() {
        let (mut session, mut updates) =
            open_session(MockTranscriber::new("mock").with_response("recovered"));

        // First valid chunk accumulates
        session.handle_chunk(&chunk_bytes(&[7, 8])).unwrap();

        // Odd-length chunk is rejected without touching the window
        let err = session.handle_chunk(&[0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, ScribeError::MalformedAudio { .. }));
        assert_eq!(session.buffered(), 2);
        assert_eq!(session.state(), SessionState::Listening);

        // Next valid chunk completes the threshold and dispatches
        let seq = session.handle_chunk(&chunk_bytes(&[9, 10])).unwrap();
        assert_eq!(seq, Some(0));
        assert_eq!(updates.recv().await.unwrap().seq(), 0);
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let settings = SessionSettings {
            max_chunk_bytes: 4,
            ..Default::default()
        };
        let (mut session, _updates) =
            Session::open(1, Arc::new(MockTranscriber::new("mock")), settings);

        let err = session.handle_chunk(&chunk_bytes(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, ScribeError::MalformedAudio { .. }));
        assert_eq!(session.buffered(), 0);
    }

    #[tokio::test]
    async fn test_finish_flushes_pending_window() {
        let (mut session, mut updates) =
            open_session(MockTranscriber::new("mock").with_response("tail"));

        // One chunk: below threshold, so still buffered
        session.handle_chunk(&chunk_bytes(&[5, 6])).unwrap();

        let seq = session.finish().await.unwrap();
        assert_eq!(seq, Some(0));
        assert_eq!(session.state(), SessionState::Closed);

        session.shutdown().await;
        assert_eq!(updates.recv().await.unwrap().seq(), 0);
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_finish_with_empty_window_dispatches_nothing() {
        let (mut session, mut updates) = open_session(MockTranscriber::new("mock"));

        assert_eq!(session.finish().await.unwrap(), None);
        session.shutdown().await;
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_chunks_after_finish_rejected_with_session_closed() {
        let (mut session, _updates) = open_session(MockTranscriber::new("mock"));

        session.finish().await.unwrap();
        let err = session.handle_chunk(&chunk_bytes(&[1])).unwrap_err();
        assert!(matches!(err, ScribeError::SessionClosed));
        assert!(err.is_session_fatal());
    }

    #[tokio::test]
    async fn test_double_finish_rejected() {
        let (mut session, _updates) = open_session(MockTranscriber::new("mock"));
        session.finish().await.unwrap();
        assert!(matches!(
            session.finish().await,
            Err(ScribeError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_finish_delivers_final_window_when_queue_full() {
        use crate::session::dispatcher::tests::StallingTranscriber;
        use std::time::Duration;

        let (transcriber, release_tx) = StallingTranscriber::new();
        let settings = SessionSettings {
            queue_depth: 1,
            ..Default::default()
        };
        let (mut session, mut updates) = Session::open(1, transcriber, settings);

        // First window stalls in the worker; second occupies the queue slot
        session.handle_chunk(&chunk_bytes(&[1, 1])).unwrap();
        assert_eq!(
            session.handle_chunk(&chunk_bytes(&[2, 2])).unwrap(),
            Some(0)
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.handle_chunk(&chunk_bytes(&[3, 3])).unwrap();
        assert_eq!(
            session.handle_chunk(&chunk_bytes(&[4, 4])).unwrap(),
            Some(1)
        );

        // One more chunk, below threshold, pending when stop arrives
        session.handle_chunk(&chunk_bytes(&[5, 5])).unwrap();
        assert_eq!(session.buffered(), 2);

        // The final flush waits out the backlog; the pending audio is not lost
        let (seq, ()) = tokio::join!(session.finish(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            release_tx.send(()).unwrap();
        });
        assert_eq!(seq.unwrap(), Some(2));

        // Drain updates before awaiting shutdown: the worker blocks sending
        // into the bounded updates channel, so awaiting it first deadlocks.
        for expected in 0..3 {
            assert_eq!(updates.recv().await.unwrap().seq(), expected);
        }
        session.shutdown().await;
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_two_windows_deliver_in_accumulation_order() {
        let (mut session, mut updates) =
            open_session(MockTranscriber::new("mock").with_response("words"));

        // Two full windows back to back
        session.handle_chunk(&chunk_bytes(&[1, 1])).unwrap();
        assert_eq!(
            session.handle_chunk(&chunk_bytes(&[2, 2])).unwrap(),
            Some(0)
        );
        session.handle_chunk(&chunk_bytes(&[3, 3])).unwrap();
        assert_eq!(
            session.handle_chunk(&chunk_bytes(&[4, 4])).unwrap(),
            Some(1)
        );

        assert_eq!(updates.recv().await.unwrap().seq(), 0);
        assert_eq!(updates.recv().await.unwrap().seq(), 1);
    }
}
