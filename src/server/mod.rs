//! WebSocket server: one connection, one session, one lightweight task.
//!
//! The accept loop hands each connection to a detached task that runs the
//! session's inbound path (decode + accumulate, fast and synchronous) while
//! dispatch completions flow back out through a writer task, so a slow
//! backend never blocks chunk ingestion for any session.

pub mod protocol;

use crate::config::Config;
use crate::error::{Result, ScribeError};
use crate::server::protocol::{ClientEvent, ServerEvent};
use crate::session::{Session, SessionSettings, SessionState};
use crate::session::dispatcher::DispatchUpdate;
use crate::stt::transcriber::Transcriber;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;

/// State for managing server shutdown.
#[derive(Debug, Clone)]
struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }
}

/// Streaming transcription server.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    transcriber: Arc<dyn Transcriber>,
    settings: SessionSettings,
    state: ServerState,
    next_session_id: AtomicU64,
    quiet: bool,
}

impl Server {
    /// Bind the listener and prepare to serve.
    pub async fn bind(
        config: &Config,
        transcriber: Arc<dyn Transcriber>,
        quiet: bool,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.server.bind_addr)
            .await
            .map_err(|e| ScribeError::Transport {
                message: format!("Failed to bind {}: {}", config.server.bind_addr, e),
            })?;
        let local_addr = listener.local_addr().map_err(ScribeError::Io)?;

        let settings = SessionSettings {
            threshold: config.audio.dispatch_threshold(),
            max_chunk_bytes: config.server.max_chunk_bytes,
            queue_depth: config.audio.dispatch_queue_depth,
        };

        Ok(Self {
            listener,
            local_addr,
            transcriber,
            settings,
            state: ServerState::new(),
            next_session_id: AtomicU64::new(1),
            quiet,
        })
    }

    /// Address the server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until shutdown is requested.
    pub async fn run(&self) -> Result<()> {
        loop {
            if self.state.is_shutdown().await {
                break;
            }

            // Accept with a timeout so the shutdown flag is observed promptly
            let accept_result = tokio::time::timeout(
                tokio::time::Duration::from_millis(100),
                self.listener.accept(),
            )
            .await;

            match accept_result {
                Ok(Ok((stream, peer))) => {
                    let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    let transcriber = Arc::clone(&self.transcriber);
                    let settings = self.settings;
                    let quiet = self.quiet;

                    if !quiet {
                        eprintln!("streamscribe: session {} connected from {}", session_id, peer);
                    }

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, session_id, transcriber, settings).await
                        {
                            eprintln!("streamscribe: session {} error: {}", session_id, e);
                        }
                        if !quiet {
                            eprintln!("streamscribe: session {} closed", session_id);
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(ScribeError::Transport {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => {
                    // Timeout - check shutdown flag again
                    continue;
                }
            }
        }

        Ok(())
    }

    /// Request shutdown; the accept loop exits on its next pass.
    ///
    /// Connections already being served run to completion on their own
    /// tasks.
    pub async fn stop(&self) {
        self.state.set_shutdown().await;
    }
}

/// Serve one client connection for its whole lifetime.
async fn handle_connection(
    stream: TcpStream,
    session_id: u64,
    transcriber: Arc<dyn Transcriber>,
    settings: SessionSettings,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| ScribeError::Transport {
            message: format!("WebSocket handshake failed: {}", e),
        })?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (mut session, updates) = Session::open(session_id, transcriber, settings);

    // All outbound events funnel through one channel so the transcription
    // order guarantee holds regardless of which side produced the event.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(32);

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    eprintln!("streamscribe: failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                // Connection gone; discard remaining results
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let forwarder = tokio::spawn(forward_updates(updates, out_tx.clone()));

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(m) => m,
            Err(_) => break,
        };

        match message {
            Message::Binary(data) => {
                if let Err(e) = session.handle_chunk(&data) {
                    if e.is_session_fatal() {
                        break;
                    }
                    send_error(&out_tx, &e).await;
                }
            }
            Message::Text(text) => match ClientEvent::from_json(&text) {
                Ok(ClientEvent::StopRecording) => {
                    if let Err(e) = session.finish().await {
                        send_error(&out_tx, &e).await;
                    }
                }
                Err(e) => {
                    let err = ScribeError::Protocol {
                        message: format!("unrecognized event: {}", e),
                    };
                    send_error(&out_tx, &err).await;
                }
            },
            Message::Close(_) => break,
            // Ping/Pong are handled by the library
            _ => {}
        }
    }

    // Disconnect or stop: flush whatever is buffered through the dispatcher.
    // If the connection is already gone the results are discarded by the
    // writer, never delivered out of order.
    if session.state() != SessionState::Closed {
        let _ = session.finish().await;
    }
    session.shutdown().await;

    drop(out_tx);
    let _ = forwarder.await;
    let _ = writer.await;

    Ok(())
}

/// Relay dispatch completions to the outbound channel, in order.
async fn forward_updates(
    mut updates: mpsc::Receiver<DispatchUpdate>,
    out_tx: mpsc::Sender<ServerEvent>,
) {
    while let Some(update) = updates.recv().await {
        let event = match update {
            DispatchUpdate::Transcribed { text, .. } => ServerEvent::Transcription { text },
            // Silence is success with no client-visible event
            DispatchUpdate::Silence { .. } => continue,
            DispatchUpdate::Failed { message, .. } => ServerEvent::Error { message },
        };
        if out_tx.send(event).await.is_err() {
            return;
        }
    }
}

async fn send_error(out_tx: &mpsc::Sender<ServerEvent>, error: &ScribeError) {
    let _ = out_tx
        .send(ServerEvent::Error {
            message: error.to_string(),
        })
        .await;
}
