//! Integration tests for the aisstream.io client and the feed supervisor
//!
//! Run with: cargo test -p aistrack --test integration_stream

mod common;

use aistrack::domain::{Mmsi, PositionSink, PositionSource};
use aistrack::infrastructure::client::spawn_ais_stream;
use aistrack::infrastructure::config::{AisStreamConfig, RelayConfig};
use aistrack::{FeedMode, FeedSupervisor, IngestPipeline};
use common::*;
use httpmock::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn stream_config(url: String) -> AisStreamConfig {
    AisStreamConfig {
        url,
        api_key: Some("test-key".to_string()),
        reconnect_initial_ms: 50,
        reconnect_max_secs: 1,
        ..AisStreamConfig::default()
    }
}

#[tokio::test]
async fn test_stream_feeds_pipeline() {
    let server = MockAisServer::start().await;
    let pipeline = Arc::new(IngestPipeline::with_capacity(64));
    let sink: Arc<dyn PositionSink> = pipeline.clone();

    let client = spawn_ais_stream(&stream_config(server.ws_url()), sink)
        .await
        .unwrap();
    assert!(wait_until(WAIT, || !server.received().is_empty()).await);

    let subscription: serde_json::Value = serde_json::from_str(&server.received()[0]).unwrap();
    verbose_println!("subscription: {}", subscription);
    assert_eq!(subscription["APIKey"], "test-key");
    assert_eq!(
        subscription["BoundingBoxes"],
        json!([[[-90.0, -180.0], [90.0, 180.0]]])
    );

    server.push(static_envelope(244000001, "NORDIC STAR@@@@"));
    server.push(position_envelope(
        244000001,
        51.95,
        4.05,
        "2024-05-01 12:00:00.000000 +0000 UTC",
    ));
    server.push(position_envelope(
        244000001,
        51.96,
        4.06,
        "2024-05-01 12:00:10.000000 +0000 UTC",
    ));
    // Older report arriving late
    server.push(position_envelope(
        244000001,
        51.90,
        4.00,
        "2024-05-01 11:59:00.000000 +0000 UTC",
    ));
    server.push(position_envelope(
        244000002,
        91.0,
        181.0,
        "2024-05-01 12:00:00.000000 +0000 UTC",
    ));
    server.push(r#"{"error": "Api Key Is Not Valid"}"#);

    let mmsi = Mmsi::new(244000001).unwrap();
    assert!(
        wait_until(WAIT, || {
            pipeline.stats().source(PositionSource::Stream).rejected == 1
                && pipeline.stats().source(PositionSource::Stream).out_of_order == 1
        })
        .await
    );

    {
        let cache = pipeline.cache();
        let cache = cache.read();
        let latest = cache.get(mmsi).unwrap();
        assert_eq!(latest.latitude, 51.96);
        assert_eq!(latest.name.as_deref(), Some("NORDIC STAR"));
        assert_eq!(latest.sog, Some(11.2));
        assert_eq!(cache.info(mmsi).unwrap().destination.as_deref(), Some("ROTTERDAM"));
        assert!(cache.get(Mmsi::new(244000002).unwrap()).is_none());
    }

    let stats = pipeline.stats().source(PositionSource::Stream);
    assert_eq!(stats.accepted, 2);
    assert!(client.metrics().messages_received >= 6);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stream_resubscribes_after_reconnect() {
    let server = MockAisServer::start().await;
    let pipeline = Arc::new(IngestPipeline::with_capacity(64));
    let sink: Arc<dyn PositionSink> = pipeline.clone();

    let mut config = stream_config(server.ws_url());
    config.idle_timeout_secs = 1;
    let client = spawn_ais_stream(&config, sink).await.unwrap();

    // The mock stays silent, so the watchdog recycles the connection
    assert!(wait_until(Duration::from_secs(8), || server.received().len() >= 2).await);
    let received = server.received();
    assert!(received.iter().all(|frame| frame.contains("\"APIKey\":\"test-key\"")));
    client.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_supervisor_fails_over_to_poller() {
    let http = MockServer::start_async().await;
    let poll_mock = http
        .mock_async(|when, then| {
            when.method(GET).path("/vessels");
            then.status(200).json_body(json!([
                {"mmsi": 244000009, "lat": 53.5, "lon": 8.5, "timestamp": 1714564800}
            ]));
        })
        .await;

    let mut config = RelayConfig::default();
    config.aisstream = stream_config(format!("ws://{}", unused_addr().await));
    config.aisstream.connect_timeout_secs = 1;
    config.poller.url = Some(http.url("/vessels"));
    config.poller.interval_secs = 1;
    config.supervisor.failover_after_secs = 1;
    config.supervisor.check_interval_ms = 50;

    let pipeline = Arc::new(IngestPipeline::with_capacity(64));
    let supervisor = Arc::new(FeedSupervisor::new(config, Arc::clone(&pipeline)));
    let running = Arc::new(AtomicBool::new(true));
    let task = {
        let supervisor = Arc::clone(&supervisor);
        let running = Arc::clone(&running);
        tokio::spawn(async move { supervisor.run(running).await })
    };

    assert!(wait_until(WAIT, || supervisor.mode() == FeedMode::Fallback).await);
    assert!(
        wait_until(WAIT, || pipeline
            .cache()
            .read()
            .get(Mmsi::new(244000009).unwrap())
            .is_some())
        .await
    );
    let status = supervisor.status();
    assert_ne!(status.stream_state, Some(feedsocket::ConnectionState::Connected));

    running.store(false, Ordering::Release);
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("supervisor did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(supervisor.mode(), FeedMode::Stopped);
    assert!(poll_mock.hits_async().await >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_supervisor_returns_to_streaming() {
    let server = MockAisServer::start().await;
    let http = MockServer::start_async().await;
    http.mock_async(|when, then| {
        when.method(GET).path("/vessels");
        then.status(200).json_body(json!([]));
    })
    .await;

    let mut config = RelayConfig::default();
    config.aisstream = stream_config(server.ws_url());
    config.poller.url = Some(http.url("/vessels"));
    config.supervisor.failover_after_secs = 1;
    config.supervisor.check_interval_ms = 50;

    let pipeline = Arc::new(IngestPipeline::with_capacity(64));
    let supervisor = Arc::new(FeedSupervisor::new(config, Arc::clone(&pipeline)));
    let running = Arc::new(AtomicBool::new(true));
    let task = {
        let supervisor = Arc::clone(&supervisor);
        let running = Arc::clone(&running);
        tokio::spawn(async move { supervisor.run(running).await })
    };

    // Connected but silent: counts as an outage
    assert!(wait_until(WAIT, || supervisor.mode() == FeedMode::Fallback).await);

    server.push(position_envelope(
        244000001,
        51.95,
        4.05,
        "2024-05-01 12:00:00.000000 +0000 UTC",
    ));
    assert!(wait_until(WAIT, || supervisor.mode() == FeedMode::Streaming).await);
    assert_eq!(pipeline.cache().read().len(), 1);

    running.store(false, Ordering::Release);
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("supervisor did not stop")
        .unwrap()
        .unwrap();
}
