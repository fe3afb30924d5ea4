//! Integration tests for reconnection strategies and the stable-connection reset

mod common;

use async_trait::async_trait;
use common::{wait_until, MockFeedServer};
use feedsocket::traits::reconnect::{
    ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy,
};
use feedsocket::*;
use std::time::Duration;

fn millis(strategy: &dyn ReconnectionStrategy, attempts: std::ops::Range<usize>) -> Vec<Option<u128>> {
    attempts
        .map(|attempt| strategy.next_delay(attempt).map(|d| d.as_millis()))
        .collect()
}

#[test]
fn test_backoff_doubles_until_limit() {
    let strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), Some(5));
    let delays = millis(&strategy, 0..6);
    verbose_println!("backoff delays: {:?}", delays);
    assert_eq!(
        delays,
        vec![Some(100), Some(200), Some(400), Some(800), Some(1600), None]
    );
}

#[test]
fn test_backoff_saturates_at_cap() {
    let capped = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(2), None);
    assert_eq!(
        millis(&capped, 0..5),
        vec![Some(500), Some(1000), Some(2000), Some(2000), Some(2000)]
    );

    let hour = Duration::from_secs(3600);
    let huge = ExponentialBackoff::new(Duration::from_millis(100), hour, None);
    for attempt in [30, 64, 100, usize::MAX - 1] {
        assert_eq!(huge.next_delay(attempt), Some(hour), "attempt {}", attempt);
    }
}

#[test]
fn test_jittered_backoff_never_exceeds_cap() {
    let strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), None)
        .with_jitter(0.3);
    assert!((0..20).all(|attempt| strategy.next_delay(attempt).unwrap() <= Duration::from_secs(1)));
}

#[test]
fn test_fixed_and_never() {
    let fixed = FixedDelay::new(Duration::from_millis(500), Some(3));
    assert_eq!(millis(&fixed, 0..4), vec![Some(500), Some(500), Some(500), None]);
    assert!(!fixed.should_reconnect(3));

    assert!(millis(&NeverReconnect, 0..10).iter().all(Option::is_none));
    assert!(!NeverReconnect.should_reconnect(0));
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AnyRoute;

struct PassThrough;

#[async_trait]
impl MessageRouter for PassThrough {
    type Message = WsMessage;
    type RouteKey = AnyRoute;

    async fn parse(&self, message: WsMessage) -> Result<Self::Message> {
        Ok(message)
    }

    fn route_key(&self, _message: &Self::Message) -> Self::RouteKey {
        AnyRoute
    }
}

struct Discard;

impl MessageHandler<WsMessage> for Discard {
    fn handle(&mut self, _message: WsMessage) -> Result<()> {
        Ok(())
    }
}

/// With max_attempts = 2 the client survives any number of drops as long as
/// each connection outlives `stable_after`.
#[tokio::test]
async fn test_stable_connection_resets_attempt_counter() {
    let server = MockFeedServer::start().await;

    let client = feedsocket::builder()
        .url(server.ws_url())
        .router(PassThrough, |routing| routing.handler(AnyRoute, Discard))
        .reconnect_strategy(FixedDelay::new(Duration::from_millis(50), Some(2)))
        .stable_after(Duration::from_millis(100))
        .build()
        .await
        .unwrap();

    for expected in 1..=4 {
        assert!(
            wait_until(Duration::from_secs(5), || server.connection_count() == expected).await,
            "connection {} never arrived",
            expected
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        server.drop_connections();
    }

    assert!(wait_until(Duration::from_secs(5), || server.connection_count() == 5).await);
    assert!(!client.is_finished());

    client.shutdown().await.unwrap();
}
