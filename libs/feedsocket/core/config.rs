use crate::traits::*;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Everything the connection task needs, assembled by the builder
pub struct ClientConfig<R>
where
    R: MessageRouter,
{
    /// WebSocket URL (wss:// or ws://)
    pub(crate) url: String,

    /// Parses frames and picks routes
    pub(crate) router: Arc<R>,

    /// Channel into each route's handler thread
    pub(crate) route_senders: HashMap<R::RouteKey, crossbeam_channel::Sender<R::Message>>,

    /// Messages sent after every handshake
    pub(crate) subscriptions: Arc<dyn SubscriptionProvider>,

    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Upper bound for the TCP + TLS + WebSocket handshake
    pub(crate) connect_timeout: Duration,

    /// Silence longer than this forces a reconnect (`None` = never)
    pub(crate) idle_timeout: Option<Duration>,

    /// A connection that lived at least this long resets the attempt counter
    pub(crate) stable_after: Duration,

    /// `true` while running; flipping to `false` stops the client
    pub(crate) shutdown_flag: Arc<AtomicBool>,
}

impl<R> ClientConfig<R>
where
    R: MessageRouter,
{
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn handler_count(&self) -> usize {
        self.route_senders.len()
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn stable_after(&self) -> Duration {
        self.stable_after
    }
}
