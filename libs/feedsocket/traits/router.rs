//! Message Routing
//!
//! ```text
//! WebSocket → Router::parse → Router::route_key → Channel → Handler thread
//!                                    ↓
//!                              RouteA Channel → RouteA Handler (sequential)
//!                              RouteB Channel → RouteB Handler (sequential)
//! ```
//!
//! Frames are parsed on the I/O task in the order they arrive, so every
//! handler observes its route's messages in wire order. Different routes are
//! handled in parallel on separate OS threads.

use crate::traits::{Result, WsMessage};
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;

/// Parses raw frames into typed messages and assigns each a route
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// enum Route { Positions, Control }
///
/// struct FeedRouter;
///
/// #[async_trait]
/// impl MessageRouter for FeedRouter {
///     type Message = FeedMessage;
///     type RouteKey = Route;
///
///     async fn parse(&self, message: WsMessage) -> Result<Self::Message> {
///         serde_json::from_str(&message.text_lossy())
///             .map_err(|e| FeedSocketError::ParseError(e.to_string()))
///     }
///
///     fn route_key(&self, message: &Self::Message) -> Self::RouteKey {
///         match message {
///             FeedMessage::Position(_) => Route::Positions,
///             _ => Route::Control,
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait MessageRouter: Send + Sync + 'static {
    /// The parsed message type
    type Message: Send + Debug + 'static;

    /// The route key type
    type RouteKey: Hash + Eq + Clone + Send + Sync + Debug + 'static;

    /// Parse a raw frame
    ///
    /// Runs inline on the connection task; keep it cheap. An `Err` is counted
    /// and logged, the connection stays up.
    async fn parse(&self, message: WsMessage) -> Result<Self::Message>;

    /// Pick the handler for a parsed message
    fn route_key(&self, message: &Self::Message) -> Self::RouteKey;
}

/// Consumes the messages of a single route, one at a time
///
/// Each handler runs on its own OS thread, so `handle` may block.
/// Returning an error logs it and moves on to the next message.
pub trait MessageHandler<M>: Send + 'static
where
    M: Send + Debug + 'static,
{
    fn handle(&mut self, message: M) -> Result<()>;

    /// Called once when the handler thread exits
    fn on_shutdown(&mut self) {}
}
