//! Common test utilities for aistrack integration tests

#![allow(dead_code)]

use aistrack::domain::{Mmsi, PositionSource, VesselPosition};
use aistrack::{IngestPipeline, RelayServer};
use chrono::{DateTime, TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn position(mmsi: u32, secs: i64) -> VesselPosition {
    VesselPosition::new(
        Mmsi::new(mmsi).unwrap(),
        50.0 + secs as f64 * 0.001,
        -1.0,
        at(secs),
        PositionSource::Stream,
    )
    .unwrap()
}

// =============================================================================
// Relay
// =============================================================================

/// A relay server on an ephemeral port
pub struct TestRelay {
    pub addr: SocketAddr,
    pub pipeline: Arc<IngestPipeline>,
    pub server: Arc<RelayServer>,
    pub running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl TestRelay {
    pub async fn start(channel_capacity: usize, max_clients: usize) -> Self {
        let pipeline = Arc::new(IngestPipeline::with_capacity(channel_capacity));
        let server = Arc::new(
            RelayServer::bind("127.0.0.1:0", pipeline.cache(), pipeline.hub(), max_clients)
                .await
                .unwrap(),
        );
        let addr = server.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));

        let task = {
            let server = Arc::clone(&server);
            let running = Arc::clone(&running);
            tokio::spawn(async move { server.run(running).await })
        };

        Self {
            addr,
            pipeline,
            server,
            running,
            task: Some(task),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connect(&self) -> ClientStream {
        let (ws, _) = tokio_tungstenite::connect_async(self.url()).await.unwrap();
        ws
    }

    /// Stop the server and wait for it to finish
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(10), task)
                .await
                .expect("relay did not stop")
                .unwrap();
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Next JSON text frame, skipping control frames; `None` on close or timeout
pub async fn next_json(ws: &mut ClientStream, timeout: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Wait for the close frame, ignoring anything before it
pub async fn expect_close(ws: &mut ClientStream, timeout: Duration) -> Option<u16> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await.ok()? {
            Some(Ok(Message::Close(frame))) => return Some(frame.map_or(1005, |f| f.code.into())),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

pub async fn send_json(ws: &mut ClientStream, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

// =============================================================================
// Mock aisstream.io server
// =============================================================================

/// Minimal aisstream.io stand-in
///
/// Records subscription frames and pushes envelopes to every client.
pub struct MockAisServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    frames: broadcast::Sender<String>,
    task: JoinHandle<()>,
}

impl MockAisServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (frames, _) = broadcast::channel::<String>(1024);

        let task = {
            let received = Arc::clone(&received);
            let frames = frames.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let received = Arc::clone(&received);
                    let mut frame_rx = frames.subscribe();
                    tokio::spawn(async move {
                        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                            return;
                        };
                        let (mut write, mut read) = ws.split();
                        loop {
                            tokio::select! {
                                msg = read.next() => match msg {
                                    Some(Ok(Message::Text(text))) => received.lock().push(text),
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                                frame = frame_rx.recv() => match frame {
                                    Ok(text) => {
                                        if write.send(Message::Text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                                    Err(broadcast::error::RecvError::Closed) => break,
                                },
                            }
                        }
                    });
                }
            })
        };

        Self {
            addr,
            received,
            frames,
            task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.frames.send(frame.into());
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

impl Drop for MockAisServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// aisstream.io position report envelope
pub fn position_envelope(mmsi: u32, lat: f64, lon: f64, time_utc: &str) -> String {
    serde_json::json!({
        "MessageType": "PositionReport",
        "MetaData": {
            "MMSI": mmsi,
            "ShipName": "",
            "latitude": lat,
            "longitude": lon,
            "time_utc": time_utc
        },
        "Message": {
            "PositionReport": {
                "UserID": mmsi,
                "Latitude": lat,
                "Longitude": lon,
                "Sog": 11.2,
                "Cog": 87.5,
                "TrueHeading": 88,
                "NavigationalStatus": 0,
                "Valid": true
            }
        }
    })
    .to_string()
}

/// aisstream.io static data envelope
pub fn static_envelope(mmsi: u32, name: &str) -> String {
    serde_json::json!({
        "MessageType": "ShipStaticData",
        "MetaData": { "MMSI": mmsi, "ShipName": name, "time_utc": "2024-05-01 12:00:00.000000 +0000 UTC" },
        "Message": {
            "ShipStaticData": {
                "UserID": mmsi,
                "Name": name,
                "CallSign": "LA1234 ",
                "Destination": "ROTTERDAM@@@",
                "Type": 70,
                "ImoNumber": 9876543,
                "Valid": true
            }
        }
    })
    .to_string()
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
