//! aisstream.io live feed
//!
//! One connection carries every vessel inside the subscribed bounding
//! boxes. Positions, static data and control frames each get their own
//! handler thread; within a route, frames are handled in wire order.

use super::types::{parse_frame, AisMessage, AisRoute, AisSubscription};
use crate::domain::{PositionSink, PositionSource, UpsertOutcome};
use crate::infrastructure::config::AisStreamConfig;
use anyhow::{anyhow, Result};
use chrono::Utc;
use feedsocket::{
    ExponentialBackoff, FeedClient, FeedSocketError, MessageHandler, MessageRouter,
    SubscriptionProvider, WsMessage,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Log a position summary every this many handled reports
const POSITION_LOG_EVERY: u64 = 5000;

// =============================================================================
// Subscription
// =============================================================================

#[async_trait::async_trait]
impl SubscriptionProvider for AisSubscription {
    async fn subscription_messages(&self) -> feedsocket::Result<Vec<WsMessage>> {
        let payload = serde_json::to_string(self)
            .map_err(|e| FeedSocketError::Subscription(e.to_string()))?;
        Ok(vec![WsMessage::Text(payload)])
    }
}

// =============================================================================
// Router - Parses WebSocket messages
// =============================================================================

/// Router for aisstream.io frames
pub struct AisRouter;

impl AisRouter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AisRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MessageRouter for AisRouter {
    type Message = AisMessage;
    type RouteKey = AisRoute;

    async fn parse(&self, message: WsMessage) -> feedsocket::Result<Self::Message> {
        // aisstream.io delivers JSON as binary frames as well as text
        let text = message.text_lossy();
        parse_frame(&text, Utc::now()).map_err(|e| FeedSocketError::ParseError(e.to_string()))
    }

    fn route_key(&self, message: &Self::Message) -> Self::RouteKey {
        message.route()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Feeds position reports into the sink
pub struct PositionHandler {
    sink: Arc<dyn PositionSink>,
    handled: u64,
    accepted: u64,
}

impl PositionHandler {
    pub fn new(sink: Arc<dyn PositionSink>) -> Self {
        Self {
            sink,
            handled: 0,
            accepted: 0,
        }
    }
}

impl MessageHandler<AisMessage> for PositionHandler {
    fn handle(&mut self, message: AisMessage) -> feedsocket::Result<()> {
        match message {
            AisMessage::Position(position) => {
                self.handled += 1;
                let outcome = self.sink.ingest(position);
                if outcome.is_accepted() {
                    self.accepted += 1;
                } else if outcome == UpsertOutcome::OutOfOrder {
                    debug!("[AIS WS] Out-of-order report dropped");
                }

                if self.handled % POSITION_LOG_EVERY == 0 {
                    debug!(
                        "[AIS WS] {} position reports handled, {} accepted",
                        self.handled, self.accepted
                    );
                }
            }
            AisMessage::Rejected { message_type, reason } => {
                self.sink.reject(PositionSource::Stream);
                debug!("[AIS WS] Rejected {}: {}", message_type, reason);
            }
            other => warn!("[AIS WS] Unexpected message on position route: {:?}", other),
        }
        Ok(())
    }

    fn on_shutdown(&mut self) {
        info!(
            "[AIS WS] Position handler stopped ({} handled, {} accepted)",
            self.handled, self.accepted
        );
    }
}

/// Merges static vessel data
pub struct StaticDataHandler {
    sink: Arc<dyn PositionSink>,
}

impl StaticDataHandler {
    pub fn new(sink: Arc<dyn PositionSink>) -> Self {
        Self { sink }
    }
}

impl MessageHandler<AisMessage> for StaticDataHandler {
    fn handle(&mut self, message: AisMessage) -> feedsocket::Result<()> {
        match message {
            AisMessage::StaticData(info) => self.sink.ingest_info(info),
            // Not a position report, so it stays out of the position stats
            AisMessage::Rejected { message_type, reason } => {
                debug!("[AIS WS] Rejected {}: {}", message_type, reason);
            }
            other => warn!("[AIS WS] Unexpected message on static data route: {:?}", other),
        }
        Ok(())
    }
}

/// Server errors and message types we ignore
#[derive(Default)]
pub struct ControlHandler {
    unknown: u64,
}

impl MessageHandler<AisMessage> for ControlHandler {
    fn handle(&mut self, message: AisMessage) -> feedsocket::Result<()> {
        match message {
            AisMessage::ServerError(reason) => {
                error!("[AIS WS] Server error: {}", reason);
            }
            AisMessage::Unknown(message_type) => {
                self.unknown += 1;
                if self.unknown == 1 || self.unknown % 1000 == 0 {
                    debug!(
                        "[AIS WS] Ignoring {} (unconsumed messages so far: {})",
                        message_type, self.unknown
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// =============================================================================
// WebSocket Client Builder
// =============================================================================

/// Connect to aisstream.io and start feeding `sink`
///
/// Uses a local shutdown flag because feedsocket sets the flag to false
/// during `client.shutdown()`; the owner stops the stream by calling it.
pub async fn spawn_ais_stream(
    config: &AisStreamConfig,
    sink: Arc<dyn PositionSink>,
) -> Result<FeedClient<AisRouter>> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("aisstream.io API key not configured"))?;

    let subscription = AisSubscription::from_config(config, api_key);
    let local_shutdown_flag = Arc::new(AtomicBool::new(true));

    let positions = PositionHandler::new(Arc::clone(&sink));
    let static_data = StaticDataHandler::new(sink);

    info!(
        "[AIS WS] Connecting to {} ({} bounding boxes)",
        config.url,
        config.bounding_boxes.len()
    );

    let client = feedsocket::builder()
        .url(config.url.as_str())
        .router(AisRouter::new(), move |routing| {
            routing
                .handler(AisRoute::Positions, positions)
                .handler(AisRoute::StaticData, static_data)
                .handler(AisRoute::Control, ControlHandler::default())
        })
        .subscriptions(subscription)
        .reconnect_strategy(
            ExponentialBackoff::new(
                Duration::from_millis(config.reconnect_initial_ms),
                Duration::from_secs(config.reconnect_max_secs),
                None,
            )
            .with_jitter(0.2),
        )
        .idle_timeout(config.idle_timeout())
        .connect_timeout(config.connect_timeout())
        .shutdown_flag(local_shutdown_flag)
        .build()
        .await?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{VesselInfo, VesselPosition};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        positions: Mutex<Vec<VesselPosition>>,
        infos: Mutex<Vec<VesselInfo>>,
        rejected: Mutex<u64>,
    }

    impl PositionSink for RecordingSink {
        fn ingest(&self, position: VesselPosition) -> UpsertOutcome {
            let mut positions = self.positions.lock();
            positions.push(position);
            UpsertOutcome::Inserted {
                seq: positions.len() as u64,
            }
        }

        fn ingest_info(&self, info: VesselInfo) {
            self.infos.lock().push(info);
        }

        fn reject(&self, _source: PositionSource) {
            *self.rejected.lock() += 1;
        }

        fn last_update_age(&self) -> Option<Duration> {
            None
        }
    }

    #[tokio::test]
    async fn test_router_parses_binary_frames() {
        let frame = r#"{"MessageType":"PositionReport","MetaData":{},"Message":{"PositionReport":{"UserID":244000001,"Latitude":52.1,"Longitude":4.2,"Valid":true}}}"#;
        let router = AisRouter::new();

        let parsed = router
            .parse(WsMessage::Binary(frame.as_bytes().to_vec()))
            .await
            .unwrap();
        assert_eq!(router.route_key(&parsed), AisRoute::Positions);

        assert!(router.parse(WsMessage::from("{not json")).await.is_err());
    }

    #[test]
    fn test_position_handler_feeds_sink() {
        let sink = Arc::new(RecordingSink::default());
        let mut handler = PositionHandler::new(sink.clone());

        let position = VesselPosition::new(
            crate::domain::Mmsi::new(244000001).unwrap(),
            52.1,
            4.2,
            Utc::now(),
            PositionSource::Stream,
        )
        .unwrap();

        handler.handle(AisMessage::Position(position)).unwrap();
        handler
            .handle(AisMessage::Rejected {
                message_type: "PositionReport".into(),
                reason: "Invalid latitude: 91".into(),
            })
            .unwrap();

        assert_eq!(sink.positions.lock().len(), 1);
        assert_eq!(*sink.rejected.lock(), 1);
    }

    #[test]
    fn test_static_rejection_not_counted_as_position() {
        let sink = Arc::new(RecordingSink::default());
        let mut handler = StaticDataHandler::new(sink.clone());

        handler
            .handle(AisMessage::Rejected {
                message_type: "ShipStaticData".into(),
                reason: "report flagged invalid".into(),
            })
            .unwrap();
        handler
            .handle(AisMessage::StaticData(VesselInfo::new(
                crate::domain::Mmsi::new(215000000).unwrap(),
            )))
            .unwrap();

        assert_eq!(*sink.rejected.lock(), 0);
        assert_eq!(sink.infos.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_message() {
        let sub = AisSubscription::from_config(&AisStreamConfig::default(), "k");
        let messages = sub.subscription_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        let text = messages[0].as_text().unwrap();
        assert!(text.contains("\"APIKey\":\"k\""));
    }

    #[tokio::test]
    async fn test_spawn_requires_api_key() {
        let sink: Arc<dyn PositionSink> = Arc::new(RecordingSink::default());
        assert!(spawn_ais_stream(&AisStreamConfig::default(), sink).await.is_err());
    }
}
