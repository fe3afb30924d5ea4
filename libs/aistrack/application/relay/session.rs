//! One connected relay client
//!
//! The session subscribes to the hub before it reads the cache, then only
//! forwards updates newer than the snapshot it sent. Updates that raced the
//! snapshot are already in it; everything after it arrives through the
//! receiver, so the client sees no gap and no duplicate.

use super::protocol::{ClientCommand, ServerMessage};
use super::server::RelayError;
use crate::application::hub::{PositionHub, ALL_VESSELS_GROUP};
use crate::domain::{Mmsi, PositionUpdate};
use crate::infrastructure::cache::SharedPositionCache;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsReader = SplitStream<WebSocketStream<TcpStream>>;

pub(crate) struct RelaySession {
    id: u64,
    peer: SocketAddr,
    cache: SharedPositionCache,
    writer: WsWriter,
    /// `None` forwards every vessel
    filter: Option<HashSet<Mmsi>>,
    /// Highest sequence number the client has seen, by snapshot or update
    last_seq: u64,
    forwarded: u64,
}

impl RelaySession {
    /// Serve the client until it leaves or `running` goes false
    pub(crate) async fn run(
        id: u64,
        peer: SocketAddr,
        ws: WebSocketStream<TcpStream>,
        cache: SharedPositionCache,
        hub: Arc<PositionHub>,
        running: Arc<AtomicBool>,
    ) -> Result<(), RelayError> {
        let (writer, reader) = ws.split();
        // Before the snapshot, or updates between the two would be lost
        let updates = hub.subscribe(ALL_VESSELS_GROUP);

        let mut session = Self {
            id,
            peer,
            cache,
            writer,
            filter: None,
            last_seq: 0,
            forwarded: 0,
        };

        info!("[Relay] Session {} opened for {}", id, peer);
        let result = session.serve(reader, updates, &running).await;
        info!(
            "[Relay] Session {} closed ({} updates forwarded)",
            session.id, session.forwarded
        );
        result
    }

    async fn serve(
        &mut self,
        mut reader: WsReader,
        mut updates: Receiver<Arc<PositionUpdate>>,
        running: &AtomicBool,
    ) -> Result<(), RelayError> {
        self.send_snapshot().await?;

        let mut ticker = tokio::time::interval(SHUTDOWN_CHECK_INTERVAL);

        loop {
            tokio::select! {
                incoming = reader.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.handle_command(&text).await?,
                        Some(Ok(Message::Binary(_))) => {
                            self.send_error("binary frames are not supported").await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("[Relay] Session {}: client closed", self.id);
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("[Relay] Session {}: read error: {}", self.id, e);
                            return Err(e.into());
                        }
                    }
                }
                update = updates.recv() => {
                    match update {
                        Ok(update) => self.forward(&update).await?,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(
                                "[Relay] Session {} ({}) lagged, {} updates dropped; resyncing",
                                self.id, self.peer, missed
                            );
                            self.send(&ServerMessage::Resync { missed }).await?;
                            self.send_snapshot().await?;
                        }
                        Err(RecvError::Closed) => return self.close(CloseCode::Away, "hub closed").await,
                    }
                }
                _ = ticker.tick() => {
                    if !running.load(Ordering::Acquire) {
                        return self.close(CloseCode::Away, "relay shutting down").await;
                    }
                }
            }
        }
    }

    async fn forward(&mut self, update: &PositionUpdate) -> Result<(), RelayError> {
        // Already covered by the last snapshot
        if update.seq <= self.last_seq {
            return Ok(());
        }
        self.last_seq = update.seq;

        let wanted = self
            .filter
            .as_ref()
            .map_or(true, |filter| filter.contains(&update.position.mmsi));
        if !wanted {
            return Ok(());
        }

        self.forwarded += 1;
        self.send(&ServerMessage::Position {
            seq: update.seq,
            vessel: &update.position,
        })
        .await
    }

    async fn handle_command(&mut self, text: &str) -> Result<(), RelayError> {
        let command = match ClientCommand::parse(text) {
            Ok(command) => command,
            Err(message) => return self.send_error(&message).await,
        };

        match command {
            ClientCommand::Ping => self.send(&ServerMessage::Pong).await,
            ClientCommand::Subscribe { mmsi } => {
                if mmsi.is_empty() {
                    return self.send_error("subscribe needs at least one mmsi").await;
                }
                debug!("[Relay] Session {} filtering {} vessels", self.id, mmsi.len());
                self.filter = Some(mmsi.into_iter().collect());
                self.send_snapshot().await
            }
            ClientCommand::Unsubscribe => {
                debug!("[Relay] Session {} back to all vessels", self.id);
                self.filter = None;
                self.send_snapshot().await
            }
        }
    }

    /// Send the cached positions the session wants and move `last_seq` to match
    async fn send_snapshot(&mut self) -> Result<(), RelayError> {
        let snapshot = self.cache.read().snapshot_filtered(self.filter.as_ref());
        self.last_seq = snapshot.seq;
        debug!(
            "[Relay] Session {}: snapshot of {} vessels at seq {}",
            self.id,
            snapshot.positions.len(),
            snapshot.seq
        );

        self.send(&ServerMessage::Snapshot {
            seq: snapshot.seq,
            vessels: &snapshot.positions,
        })
        .await
    }

    async fn send_error(&mut self, message: &str) -> Result<(), RelayError> {
        self.send(&ServerMessage::Error {
            message: message.to_string(),
        })
        .await
    }

    async fn send(&mut self, message: &ServerMessage<'_>) -> Result<(), RelayError> {
        let json = message.to_json()?;
        self.writer.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn close(&mut self, code: CloseCode, reason: &'static str) -> Result<(), RelayError> {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        // The peer may already be gone
        let _ = self.writer.send(Message::Close(Some(frame))).await;
        Ok(())
    }
}
