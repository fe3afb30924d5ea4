pub mod states;

use crate::core::client::FeedClient;
use crate::core::config::ClientConfig;
use crate::traits::*;
use states::*;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STABLE_AFTER: Duration = Duration::from_secs(30);

/// Idle handler threads re-check the running flag this often
const HANDLER_IDLE_CHECK: Duration = Duration::from_millis(50);

/// Optional settings, carried unchanged across type-state transitions
struct BuilderOptions {
    subscriptions: Option<Arc<dyn SubscriptionProvider>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    connect_timeout: Duration,
    idle_timeout: Option<Duration>,
    stable_after: Duration,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            subscriptions: None,
            reconnect_strategy: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: None,
            stable_after: DEFAULT_STABLE_AFTER,
            shutdown_flag: None,
        }
    }
}

/// Type-state builder for [`FeedClient`]
///
/// `build()` only exists once both a URL and a router are set.
pub struct FeedClientBuilder<U, Ro>
where
    U: UrlState,
{
    _url_state: PhantomData<U>,
    url: Option<String>,
    routing: Ro,
    options: BuilderOptions,
}

impl FeedClientBuilder<NoUrl, NoRouter> {
    pub fn new() -> Self {
        Self {
            _url_state: PhantomData,
            url: None,
            routing: NoRouter,
            options: BuilderOptions::default(),
        }
    }
}

impl Default for FeedClientBuilder<NoUrl, NoRouter> {
    fn default() -> Self {
        Self::new()
    }
}

// URL setting
impl<Ro> FeedClientBuilder<NoUrl, Ro> {
    pub fn url(self, url: impl Into<String>) -> FeedClientBuilder<HasUrl, Ro> {
        FeedClientBuilder {
            _url_state: PhantomData,
            url: Some(url.into()),
            routing: self.routing,
            options: self.options,
        }
    }
}

/// Collects one handler per route key
pub struct RoutingBuilder<R>
where
    R: MessageRouter,
{
    handlers: HashMap<R::RouteKey, Box<dyn MessageHandler<R::Message>>>,
}

impl<R> RoutingBuilder<R>
where
    R: MessageRouter,
{
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add a handler for a route key (replaces any earlier one)
    pub fn handler<H>(mut self, route_key: R::RouteKey, handler: H) -> Self
    where
        H: MessageHandler<R::Message>,
    {
        if self.handlers.insert(route_key.clone(), Box::new(handler)).is_some() {
            warn!("Replacing handler for route {:?}", route_key);
        }
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Start one OS thread per route; the returned senders feed them
    fn spawn(self, running: &Arc<AtomicBool>) -> Result<SpawnedRoutes<R>> {
        let mut routes = SpawnedRoutes {
            senders: HashMap::with_capacity(self.handlers.len()),
            threads: Vec::with_capacity(self.handlers.len()),
        };

        for (route, handler) in self.handlers {
            let (tx, rx) = crossbeam_channel::unbounded::<R::Message>();
            let running = Arc::clone(running);
            let thread = std::thread::Builder::new()
                .name(format!("feed-handler-{:?}", route))
                .spawn({
                    let route = route.clone();
                    move || drain_route(route, handler, rx, running)
                })
                .map_err(|e| {
                    FeedSocketError::Configuration(format!("Failed to spawn handler thread: {}", e))
                })?;

            routes.senders.insert(route, tx);
            routes.threads.push(thread);
        }

        Ok(routes)
    }
}

struct SpawnedRoutes<R>
where
    R: MessageRouter,
{
    senders: HashMap<R::RouteKey, crossbeam_channel::Sender<R::Message>>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

/// Body of a handler thread
///
/// Messages are handled in arrival order. The thread ends when the channel
/// closes, or when it sits idle after shutdown was requested.
fn drain_route<K, M>(
    route: K,
    mut handler: Box<dyn MessageHandler<M>>,
    rx: crossbeam_channel::Receiver<M>,
    running: Arc<AtomicBool>,
) where
    K: std::fmt::Debug,
    M: Send + std::fmt::Debug + 'static,
{
    use crossbeam_channel::RecvTimeoutError;

    loop {
        match rx.recv_timeout(HANDLER_IDLE_CHECK) {
            Ok(message) => {
                if let Err(e) = handler.handle(message) {
                    error!("Handler for route {:?} failed: {}", route, e);
                }
            }
            Err(RecvTimeoutError::Timeout) if !running.load(Ordering::Acquire) => {
                debug!("Handler for route {:?} stopping on shutdown", route);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Route {:?} closed, handler exiting", route);
                break;
            }
        }
    }
    handler.on_shutdown();
}

// Router setting
impl<U> FeedClientBuilder<U, NoRouter>
where
    U: UrlState,
{
    pub fn router<R, F>(self, router: R, configure_routing: F) -> FeedClientBuilder<U, Routed<R>>
    where
        R: MessageRouter,
        F: FnOnce(RoutingBuilder<R>) -> RoutingBuilder<R>,
    {
        let routing = configure_routing(RoutingBuilder::new());
        FeedClientBuilder {
            _url_state: PhantomData,
            url: self.url,
            routing: Routed { router, routing },
            options: self.options,
        }
    }
}

// Optional configuration methods
impl<U, Ro> FeedClientBuilder<U, Ro>
where
    U: UrlState,
{
    /// Messages to send after every handshake
    pub fn subscriptions(mut self, provider: impl SubscriptionProvider + 'static) -> Self {
        self.options.subscriptions = Some(Arc::new(provider));
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.options.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Force a reconnect when no data frame arrives for this long
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.options.idle_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// A connection that survives this long resets the backoff attempt counter
    pub fn stable_after(mut self, duration: Duration) -> Self {
        self.options.stable_after = duration;
        self
    }

    /// Share a shutdown flag with other components
    ///
    /// While the flag is `true` the client runs. Setting it to `false` stops
    /// reconnection, closes the socket and lets handler threads drain.
    ///
    /// # Example
    /// ```ignore
    /// let shutdown_flag = Arc::new(AtomicBool::new(true));
    ///
    /// let client = feedsocket::builder()
    ///     .url("wss://feed.example.com")
    ///     .router(MyRouter, |routing| routing.handler(Route::Main, MyHandler))
    ///     .shutdown_flag(Arc::clone(&shutdown_flag))
    ///     .build()
    ///     .await?;
    ///
    /// shutdown_flag.store(false, Ordering::Release);
    /// ```
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.options.shutdown_flag = Some(flag);
        self
    }
}

/// 1s doubling to 60s with 20% jitter, never giving up
fn default_strategy() -> Box<dyn ReconnectionStrategy> {
    Box::new(
        ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), None)
            .with_jitter(0.2),
    )
}

// `build()` exists only once URL and router are both set
impl<R> FeedClientBuilder<HasUrl, Routed<R>>
where
    R: MessageRouter,
{
    pub async fn build(self) -> Result<FeedClient<R>> {
        let url = match self.url {
            Some(url) if url.starts_with("ws://") || url.starts_with("wss://") => url,
            Some(url) => {
                return Err(FeedSocketError::Configuration(format!(
                    "URL must use ws:// or wss://, got {}",
                    url
                )))
            }
            None => return Err(FeedSocketError::Configuration("URL must be set".into())),
        };

        let Routed { router, routing } = self.routing;
        if routing.handler_count() == 0 {
            warn!("Feed client for {} has no handlers; parsed messages will be dropped", url);
        }

        let BuilderOptions {
            subscriptions,
            reconnect_strategy,
            connect_timeout,
            idle_timeout,
            stable_after,
            shutdown_flag,
        } = self.options;

        let shutdown_flag = shutdown_flag.unwrap_or_else(|| Arc::new(AtomicBool::new(true)));
        let routes = routing.spawn(&shutdown_flag)?;

        let config = ClientConfig {
            url,
            router: Arc::new(router),
            route_senders: routes.senders,
            subscriptions: subscriptions.unwrap_or_else(|| Arc::new(NoSubscription)),
            reconnect_strategy: reconnect_strategy.unwrap_or_else(default_strategy),
            connect_timeout,
            idle_timeout,
            stable_after,
            shutdown_flag,
        };
        debug!(
            "Starting feed client for {} with {} handler(s)",
            config.url(),
            config.handler_count()
        );

        let mut client = FeedClient::start(config);
        client.handler_handles = routes.threads;
        Ok(client)
    }
}
