use std::time::Duration;
use thiserror::Error;

/// Main error type for feedsocket
#[derive(Error, Debug)]
pub enum FeedSocketError {
    /// WebSocket protocol or transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed by the peer
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Connection attempt did not finish in time
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No data received for longer than the idle timeout
    #[error("Feed stale: no data for {0:?}")]
    Stale(Duration),

    /// Building subscription messages failed
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Message parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reconnection gave up
    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    ReconnectionFailed { attempts: usize, reason: String },

    /// Handler rejected a message
    #[error("Handler error: {0}")]
    Handler(String),
}

impl FeedSocketError {
    /// Whether the error ended the connection (as opposed to a single message)
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            FeedSocketError::WebSocket(_)
                | FeedSocketError::ConnectionClosed(_)
                | FeedSocketError::ConnectTimeout(_)
                | FeedSocketError::Stale(_)
                | FeedSocketError::Subscription(_)
        )
    }
}

/// Result type for feedsocket operations
pub type Result<T> = std::result::Result<T, FeedSocketError>;
