use crate::core::config::ClientConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::watchdog::FeedWatchdog;
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Granularity of shutdown and watchdog checks inside the task
const TASK_TICK: Duration = Duration::from_millis(100);

enum Outbound {
    Frame(WsMessage),
    Close,
}

/// Lifecycle notifications emitted by the connection task
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// Reconnect attempt number (1-based)
    Reconnecting(usize),
    /// Connection dropped because no data arrived for this long
    Stale(Duration),
    Error(String),
}

/// Point-in-time copy of the client counters
#[derive(Debug, Clone)]
pub struct FeedStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub parse_errors: u64,
    pub reconnect_count: u64,
    pub stale_disconnects: u64,
    pub connection_state: ConnectionState,
    pub time_since_last_message: Option<Duration>,
}

/// Handle to a supervised feed connection
///
/// The connection itself lives in a background tokio task that connects,
/// sends subscriptions, reads and routes frames, and reconnects according
/// to the configured strategy. Parsed messages are delivered to handler
/// threads; lifecycle changes are published as [`ClientEvent`]s.
pub struct FeedClient<R>
where
    R: MessageRouter,
{
    url: String,
    state: Arc<AtomicConnectionState>,
    counters: Arc<AtomicMetrics>,
    watchdog: Arc<FeedWatchdog>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: Receiver<ClientEvent>,
    task: Option<tokio::task::JoinHandle<()>>,
    pub(crate) handler_handles: Vec<std::thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    _router: PhantomData<fn() -> R>,
}

impl<R> FeedClient<R>
where
    R: MessageRouter,
{
    /// Spawn the connection task. Called by the builder.
    pub(crate) fn start(config: ClientConfig<R>) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = unbounded();

        let task = ConnectionTask {
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            counters: Arc::new(AtomicMetrics::new()),
            watchdog: Arc::new(FeedWatchdog::new(config.idle_timeout)),
            events: event_tx,
            config,
        };

        let url = task.config.url.clone();
        let running = Arc::clone(&task.config.shutdown_flag);
        let state = Arc::clone(&task.state);
        let counters = Arc::clone(&task.counters);
        let watchdog = Arc::clone(&task.watchdog);
        let handle = tokio::spawn(task.run(outbound_rx));

        Self {
            url,
            state,
            counters,
            watchdog,
            outbound,
            events,
            task: Some(handle),
            handler_handles: Vec::new(),
            running,
            _router: PhantomData,
        }
    }

    /// Queue a frame for the feed
    ///
    /// Frames queued while disconnected go out on the next connection,
    /// after its subscriptions.
    pub fn send(&self, message: WsMessage) -> Result<()> {
        self.outbound
            .send(Outbound::Frame(message))
            .map_err(|_| FeedSocketError::ChannelSend("connection task has exited".to_string()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Time since the last data frame on the current connection
    pub fn time_since_last_message(&self) -> Option<Duration> {
        self.watchdog.time_since_last_message()
    }

    /// Time the feed has been silent (since connect if nothing arrived yet)
    pub fn idle_for(&self) -> Duration {
        self.watchdog.idle_for()
    }

    pub fn metrics(&self) -> FeedStats {
        FeedStats {
            messages_sent: self.counters.messages_sent(),
            messages_received: self.counters.messages_received(),
            parse_errors: self.counters.parse_errors(),
            reconnect_count: self.counters.reconnect_count(),
            stale_disconnects: self.counters.stale_disconnects(),
            connection_state: self.state.get(),
            time_since_last_message: self.watchdog.time_since_last_message(),
        }
    }

    /// Next pending lifecycle event, if any
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for an event
    ///
    /// Blocks the calling thread; from async code prefer polling
    /// [`try_recv_event`](Self::try_recv_event).
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<ClientEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Whether the connection task has finished (shutdown or strategy exhausted)
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub fn shutdown_flag(&self) -> &Arc<AtomicBool> {
        &self.running
    }

    /// Stop the client: close the socket, drain and join handler threads
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Stopping feed client for {}", self.url);

        self.running.store(false, Ordering::Release);
        self.state.set(ConnectionState::ShuttingDown);
        let _ = self.outbound.send(Outbound::Close);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Connection task for {} ended abnormally: {}", self.url, e);
            }
        }

        // The task owned the route senders; with it gone the handler
        // channels are closed and each thread exits once drained.
        let threads = std::mem::take(&mut self.handler_handles);
        let joined = threads.len();
        tokio::task::spawn_blocking(move || {
            threads.into_iter().for_each(|thread| {
                let _ = thread.join();
            })
        })
        .await
        .map_err(|e| FeedSocketError::Handler(e.to_string()))?;

        debug!("Joined {} handler threads", joined);
        info!("Feed client for {} stopped", self.url);
        Ok(())
    }
}

#[inline]
fn still_running(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Acquire)
}

/// Sleep for `duration` unless shutdown is requested first
///
/// Returns `false` if interrupted by shutdown.
async fn sleep_while_running(duration: Duration, flag: &AtomicBool) -> bool {
    let deadline = tokio::time::Instant::now() + duration;
    while still_running(flag) {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        if left.is_zero() {
            return true;
        }
        tokio::time::sleep(left.min(TASK_TICK)).await;
    }
    false
}

/// Resolves once the shutdown flag goes false
async fn stopped(flag: &AtomicBool) {
    while still_running(flag) {
        tokio::time::sleep(TASK_TICK).await;
    }
}

/// How a single connection ended
enum SessionEnd {
    /// Shutdown requested; do not reconnect
    Requested,
    /// Lost for the given reason; reconnect per strategy
    Lost(FeedSocketError),
}

/// State owned by the background task
struct ConnectionTask<R>
where
    R: MessageRouter,
{
    config: ClientConfig<R>,
    state: Arc<AtomicConnectionState>,
    counters: Arc<AtomicMetrics>,
    watchdog: Arc<FeedWatchdog>,
    events: Sender<ClientEvent>,
}

impl<R> ConnectionTask<R>
where
    R: MessageRouter,
{
    fn emit(&self, event: ClientEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn active(&self) -> bool {
        still_running(&self.config.shutdown_flag) && !self.state.is_shutting_down()
    }

    /// Connect, serve, back off; until shutdown or the strategy gives up
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let url = self.config.url.clone();
        let mut attempt: usize = 0;

        while self.active() {
            if attempt == 0 {
                self.state.set(ConnectionState::Connecting);
            } else {
                self.state.set(ConnectionState::Reconnecting);
                self.emit(ClientEvent::Reconnecting(attempt));
            }

            let stream = match self.open().await {
                Ok(Some(stream)) => stream,
                Ok(None) => {
                    debug!("Shutdown requested while connecting to {}", url);
                    break;
                }
                Err(e) => {
                    error!("Failed to connect to {}: {}", url, e);
                    self.state.set(ConnectionState::Disconnected);
                    self.emit(ClientEvent::Error(e.to_string()));
                    if self.back_off(&mut attempt).await {
                        continue;
                    }
                    break;
                }
            };

            info!("Connected to {}", url);
            self.watchdog.arm();
            self.state.set(ConnectionState::Connected);
            self.emit(ClientEvent::Connected);

            let opened = Instant::now();
            let end = self.serve(stream, &mut outbound).await;
            let lifetime = opened.elapsed();
            if lifetime >= self.config.stable_after {
                attempt = 0;
            }

            if !self.state.is_shutting_down() {
                self.state.set(ConnectionState::Disconnected);
            }
            self.emit(ClientEvent::Disconnected);

            match end {
                SessionEnd::Requested => {
                    debug!("Connection to {} closed on request after {:?}", url, lifetime);
                    break;
                }
                SessionEnd::Lost(FeedSocketError::Stale(idle)) => {
                    self.counters.increment_stale_disconnects();
                    warn!("Feed {} silent for {:?}, forcing reconnect", url, idle);
                    self.emit(ClientEvent::Stale(idle));
                }
                SessionEnd::Lost(e) => {
                    error!("Connection to {} lost after {:?}: {}", url, lifetime, e);
                    self.emit(ClientEvent::Error(e.to_string()));
                }
            }

            if !self.back_off(&mut attempt).await {
                break;
            }
        }

        if !self.state.is_shutting_down() {
            self.state.set(ConnectionState::Disconnected);
        }
        info!("Feed client task for {} exiting", url);
    }

    /// Wait out the strategy's delay; `false` ends the loop
    async fn back_off(&self, attempt: &mut usize) -> bool {
        if !still_running(&self.config.shutdown_flag) {
            return false;
        }
        let Some(delay) = self.config.reconnect_strategy.next_delay(*attempt) else {
            let err = FeedSocketError::ReconnectionFailed {
                attempts: *attempt,
                reason: "reconnection strategy exhausted".to_string(),
            };
            warn!("{}", err);
            self.emit(ClientEvent::Error(err.to_string()));
            return false;
        };

        info!("Reconnecting to {} in {:?} (attempt {})", self.config.url, delay, *attempt + 1);
        if !sleep_while_running(delay, &self.config.shutdown_flag).await {
            debug!("Shutdown requested during reconnect delay");
            return false;
        }
        *attempt += 1;
        self.counters.increment_reconnects();
        true
    }

    /// Open the socket, bounded by the connect timeout
    ///
    /// `Ok(None)` means shutdown was requested mid-handshake.
    async fn open(&self) -> Result<Option<WsStream>> {
        let timeout = self.config.connect_timeout;
        let handshake = tokio::time::timeout(timeout, connect_async(self.config.url.as_str()));
        tokio::select! {
            outcome = handshake => match outcome {
                Ok(Ok((stream, _response))) => Ok(Some(stream)),
                Ok(Err(e)) => Err(FeedSocketError::WebSocket(e.to_string())),
                Err(_) => Err(FeedSocketError::ConnectTimeout(timeout)),
            },
            _ = stopped(&self.config.shutdown_flag) => Ok(None),
        }
    }

    /// Send the subscription set for a fresh connection
    async fn subscribe(&self, writer: &mut WsWriter) -> Result<()> {
        let frames = self
            .config
            .subscriptions
            .subscription_messages()
            .await
            .map_err(|e| FeedSocketError::Subscription(e.to_string()))?;
        for frame in &frames {
            writer.send(to_frame(frame)).await.map_err(|e| {
                FeedSocketError::WebSocket(format!("Failed to send subscription: {}", e))
            })?;
            self.counters.increment_sent();
        }
        if !frames.is_empty() {
            debug!("Sent {} subscription message(s) to {}", frames.len(), self.config.url);
        }
        Ok(())
    }

    /// Drive one established connection until it ends
    async fn serve(
        &self,
        stream: WsStream,
        outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    ) -> SessionEnd {
        let (mut writer, mut reader) = stream.split();
        if let Err(e) = self.subscribe(&mut writer).await {
            return SessionEnd::Lost(e);
        }

        let mut ticker = tokio::time::interval(TASK_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let end = loop {
            tokio::select! {
                incoming = reader.next() => {
                    if let Err(e) = self.on_incoming(incoming).await {
                        break SessionEnd::Lost(e);
                    }
                }
                command = outbound.recv() => match command {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = writer.send(to_frame(&frame)).await {
                            break SessionEnd::Lost(FeedSocketError::WebSocket(e.to_string()));
                        }
                        self.counters.increment_sent();
                    }
                    Some(Outbound::Close) | None => {
                        info!("Closing connection to {}", self.config.url);
                        break SessionEnd::Requested;
                    }
                },
                _ = ticker.tick() => {
                    if !still_running(&self.config.shutdown_flag) {
                        break SessionEnd::Requested;
                    }
                    if self.watchdog.is_stale() {
                        break SessionEnd::Lost(FeedSocketError::Stale(self.watchdog.idle_for()));
                    }
                }
            }
        };

        let _ = writer.close().await;
        end
    }

    /// Handle one item from the read half; `Err` ends the connection
    async fn on_incoming(
        &self,
        incoming: Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Result<()> {
        match incoming {
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("{} {}", f.code, f.reason))
                    .unwrap_or_else(|| "close frame without reason".to_string());
                Err(FeedSocketError::ConnectionClosed(reason))
            }
            Some(Ok(frame)) => {
                if let Some(message) = from_frame(frame) {
                    self.watchdog.record_message();
                    self.counters.increment_received();
                    self.dispatch(message).await;
                }
                Ok(())
            }
            Some(Err(e)) => Err(FeedSocketError::WebSocket(e.to_string())),
            None => Err(FeedSocketError::ConnectionClosed("Stream ended".into())),
        }
    }

    /// Parse a frame and hand it to its route's handler thread
    async fn dispatch(&self, message: WsMessage) {
        let parsed = match self.config.router.parse(message).await {
            Ok(parsed) => parsed,
            Err(e) => {
                self.counters.increment_parse_errors();
                warn!("Parse error: {}", e);
                return;
            }
        };
        let route = self.config.router.route_key(&parsed);
        match self.config.route_senders.get(&route) {
            Some(sender) => {
                if sender.send(parsed).is_err() {
                    debug!("Handler for route {:?} has exited, dropping message", route);
                }
            }
            None => warn!("No handler configured for route key: {:?}", route),
        }
    }
}

fn to_frame(message: &WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text.clone()),
        WsMessage::Binary(bytes) => Message::Binary(bytes.clone()),
    }
}

/// Data frames only; control frames are handled by tungstenite
fn from_frame(frame: Message) -> Option<WsMessage> {
    match frame {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(bytes) => Some(WsMessage::Binary(bytes)),
        _ => None,
    }
}
