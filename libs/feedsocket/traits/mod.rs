//! # FeedSocket Traits
//!
//! The seams a feed client is assembled from:
//!
//! - **MessageRouter**: parse raw frames into typed messages and pick a route
//! - **MessageHandler**: consume one route's messages in order
//! - **SubscriptionProvider**: produce the messages sent after every connect
//! - **ReconnectionStrategy**: decide how long to wait between attempts

pub mod error;
pub mod parser;
pub mod reconnect;
pub mod router;
pub mod subscription;

pub use error::{FeedSocketError, Result};
pub use parser::WsMessage;
pub use reconnect::{AttemptLimit, ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use router::{MessageHandler, MessageRouter};
pub use subscription::{NoSubscription, StaticSubscription, SubscriptionProvider};
