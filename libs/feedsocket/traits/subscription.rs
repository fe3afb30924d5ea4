use crate::traits::{Result, WsMessage};
use async_trait::async_trait;

/// Produces the messages a feed expects right after the handshake
///
/// Called on every connection, including reconnections, so feeds that
/// drop subscriptions with the socket are resubscribed automatically.
/// Messages are sent in order before the first read.
///
/// # Example
/// ```ignore
/// struct KeyedSubscription { api_key: String }
///
/// #[async_trait::async_trait]
/// impl SubscriptionProvider for KeyedSubscription {
///     async fn subscription_messages(&self) -> Result<Vec<WsMessage>> {
///         Ok(vec![WsMessage::Text(format!(r#"{{"key":"{}"}}"#, self.api_key))])
///     }
/// }
/// ```
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn subscription_messages(&self) -> Result<Vec<WsMessage>>;
}

/// Feed that needs no subscription (streams selected in the URL)
pub struct NoSubscription;

#[async_trait]
impl SubscriptionProvider for NoSubscription {
    async fn subscription_messages(&self) -> Result<Vec<WsMessage>> {
        Ok(Vec::new())
    }
}

/// A fixed list of messages, resent verbatim on every connection
pub struct StaticSubscription {
    messages: Vec<WsMessage>,
}

impl StaticSubscription {
    pub fn new(messages: Vec<WsMessage>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl SubscriptionProvider for StaticSubscription {
    async fn subscription_messages(&self) -> Result<Vec<WsMessage>> {
        Ok(self.messages.clone())
    }
}
