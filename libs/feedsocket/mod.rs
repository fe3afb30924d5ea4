//! # FeedSocket
//!
//! A reconnecting WebSocket client for long-lived data feeds.
//!
//! ## Features
//!
//! - **Supervised connection loop**: connect, subscribe, read, back off, repeat
//! - **Type-state builder**: URL and router must be set before `build()` exists
//! - **Ordered routing**: messages parsed in wire order, one handler thread per route
//! - **Resubscription**: subscription messages regenerated on every (re)connect
//! - **Data-flow watchdog**: a silent-but-open socket is treated as dead

pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use core::{
    builder::{states, FeedClientBuilder, RoutingBuilder},
    client::{ClientEvent, FeedClient, FeedStats},
    config::ClientConfig,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    watchdog::FeedWatchdog,
};

/// Create a new feed client builder
///
/// # Example
/// ```ignore
/// let client = feedsocket::builder()
///     .url("wss://stream.example.com/v0/stream")
///     .router(MyRouter, |routing| routing.handler(Route::Main, MyHandler))
///     .subscriptions(MySubscription::new(api_key))
///     .idle_timeout(Duration::from_secs(60))
///     .build()
///     .await?;
/// ```
pub fn builder() -> FeedClientBuilder<states::NoUrl, states::NoRouter> {
    FeedClientBuilder::new()
}
