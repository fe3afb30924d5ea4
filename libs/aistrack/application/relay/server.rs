//! WebSocket relay server
//!
//! Accepts clients and runs one [`RelaySession`] task per connection.

use super::protocol::ServerMessage;
use super::session::RelaySession;
use crate::application::hub::PositionHub;
use crate::infrastructure::cache::SharedPositionCache;
use futures::SinkExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long sessions get to send their close frames on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Handshake timed out")]
    HandshakeTimeout,
}

/// Holds one slot of the session count for as long as it lives
struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(active))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct RelayServer {
    listener: TcpListener,
    cache: SharedPositionCache,
    hub: Arc<PositionHub>,
    max_clients: usize,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl RelayServer {
    pub async fn bind(
        addr: &str,
        cache: SharedPositionCache,
        hub: Arc<PositionHub>,
        max_clients: usize,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        info!("[Relay] Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            cache,
            hub,
            max_clients: max_clients.max(1),
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Accept clients until `running` goes false, then close every session
    pub async fn run(&self, running: Arc<AtomicBool>) {
        let mut sessions = JoinSet::new();
        let mut ticker = tokio::time::interval(SHUTDOWN_CHECK_INTERVAL);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.admit(stream, peer, &running, &mut sessions),
                        Err(e) => warn!("[Relay] Accept failed: {}", e),
                    }
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_end(finished);
                }
                _ = ticker.tick() => {
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
        }

        info!("[Relay] Stopping, {} sessions open", sessions.len());
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(finished) = sessions.join_next().await {
                log_session_end(finished);
            }
        })
        .await;
        if drained.is_err() {
            warn!("[Relay] Sessions did not close in time, aborting");
            sessions.abort_all();
        }
        info!("[Relay] Stopped");
    }

    fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        running: &Arc<AtomicBool>,
        sessions: &mut JoinSet<Result<(), RelayError>>,
    ) {
        if self.active_sessions() >= self.max_clients {
            warn!(
                "[Relay] Rejecting {}: {} clients already connected",
                peer, self.max_clients
            );
            sessions.spawn(reject(stream, self.max_clients));
            return;
        }

        let guard = SessionGuard::acquire(&self.active);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cache = Arc::clone(&self.cache);
        let hub = Arc::clone(&self.hub);
        let running = Arc::clone(running);

        sessions.spawn(async move {
            let _guard = guard;
            let ws = handshake(stream).await?;
            RelaySession::run(id, peer, ws, cache, hub, running).await
        });
    }
}

async fn handshake(
    stream: TcpStream,
) -> Result<tokio_tungstenite::WebSocketStream<TcpStream>, RelayError> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream)).await {
        Ok(ws) => Ok(ws?),
        Err(_) => Err(RelayError::HandshakeTimeout),
    }
}

/// Complete the handshake only to explain why the client is turned away
async fn reject(stream: TcpStream, max_clients: usize) -> Result<(), RelayError> {
    let mut ws = handshake(stream).await?;
    let message = ServerMessage::Error {
        message: format!("relay is full ({} clients)", max_clients),
    };
    ws.send(Message::Text(message.to_json()?)).await?;
    ws.close(Some(CloseFrame {
        code: CloseCode::Policy,
        reason: "too many clients".into(),
    }))
    .await?;
    Ok(())
}

fn log_session_end(finished: Result<Result<(), RelayError>, tokio::task::JoinError>) {
    match finished {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("[Relay] Session ended with error: {}", e),
        Err(e) => warn!("[Relay] Session task failed: {}", e),
    }
}
