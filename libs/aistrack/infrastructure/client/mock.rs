//! Synthetic traffic for running without an aisstream.io key
//!
//! Vessels random-walk inside a bounding box at plausible speeds. The RNG
//! is seeded from config, so two feeds with the same seed produce the same
//! tracks.

use crate::domain::{
    Mmsi, PositionSink, PositionSource, UpsertOutcome, VesselInfo, VesselPosition,
};
use crate::infrastructure::config::{BoundingBox, MockConfig};
use crate::infrastructure::shutdown::interruptible_sleep;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Synthetic MMSIs start above this (9xx is not allocated to real ships)
const MOCK_MMSI_BASE: u32 = 900_000_000;
const MAX_MOCK_VESSELS: usize = 10_000;
const MAX_SPEED_KNOTS: f64 = 24.0;
const LOG_EVERY_TICKS: u64 = 60;

#[derive(Debug, Clone)]
struct MockVessel {
    mmsi: Mmsi,
    name: String,
    latitude: f64,
    longitude: f64,
    sog: f64,
    cog: f64,
    nav_status: u8,
    last_timestamp: Option<DateTime<Utc>>,
}

pub struct MockAisFeed {
    vessels: Vec<MockVessel>,
    rng: StdRng,
    area: BoundingBox,
    interval: Duration,
    ticks: u64,
}

impl MockAisFeed {
    pub fn new(config: &MockConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let area = config.area;
        let count = config.vessel_count.min(MAX_MOCK_VESSELS);

        let vessels = (0..count)
            .filter_map(|i| {
                let mmsi = Mmsi::new(MOCK_MMSI_BASE + i as u32 + 1).ok()?;
                Some(MockVessel {
                    mmsi,
                    name: format!("MOCK VESSEL {}", i + 1),
                    latitude: between(&mut rng, area.min_lat, area.max_lat),
                    longitude: between(&mut rng, area.min_lon, area.max_lon),
                    sog: rng.gen_range(0.5..MAX_SPEED_KNOTS),
                    cog: rng.gen_range(0.0..360.0),
                    nav_status: 0,
                    last_timestamp: None,
                })
            })
            .collect();

        Self {
            vessels,
            rng,
            area,
            interval: config.interval(),
            ticks: 0,
        }
    }

    pub fn vessel_count(&self) -> usize {
        self.vessels.len()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Static data for every synthetic vessel, so names show up in snapshots
    pub fn vessel_infos(&self) -> Vec<VesselInfo> {
        self.vessels
            .iter()
            .map(|v| VesselInfo::new(v.mmsi).with_name(&v.name).with_ship_type(70))
            .collect()
    }

    /// Advance every vessel by one interval and report where it is
    pub fn tick(&mut self) -> Vec<VesselPosition> {
        self.ticks += 1;
        let hours = self.interval.as_secs_f64() / 3600.0;
        let now = Utc::now();
        let area = self.area;

        let mut positions = Vec::with_capacity(self.vessels.len());
        for vessel in &mut self.vessels {
            vessel.cog = (vessel.cog + self.rng.gen_range(-5.0..=5.0)).rem_euclid(360.0);
            vessel.sog = (vessel.sog + self.rng.gen_range(-0.5..=0.5)).clamp(0.0, MAX_SPEED_KNOTS);
            vessel.nav_status = if vessel.sog < 0.3 { 1 } else { 0 };
            advance(vessel, hours, &area);

            // Strictly increasing per vessel so the cache never sees a duplicate
            let timestamp = match vessel.last_timestamp {
                Some(last) if now <= last => last + ChronoDuration::milliseconds(1),
                _ => now,
            };
            vessel.last_timestamp = Some(timestamp);

            let position = VesselPosition::new(
                vessel.mmsi,
                vessel.latitude,
                vessel.longitude,
                timestamp,
                PositionSource::Mock,
            );
            if let Ok(position) = position {
                positions.push(
                    position
                        .with_sog(vessel.sog)
                        .with_cog(vessel.cog)
                        .with_heading(vessel.cog)
                        .with_nav_status(vessel.nav_status)
                        .with_name(&vessel.name),
                );
            }
        }
        positions
    }

    /// Feed `sink` every interval until `running` goes false
    pub async fn run(mut self, sink: Arc<dyn PositionSink>, running: Arc<AtomicBool>) {
        info!(
            "[Mock] Generating {} vessels every {:?}",
            self.vessels.len(),
            self.interval
        );
        for info in self.vessel_infos() {
            sink.ingest_info(info);
        }

        while running.load(Ordering::Acquire) {
            let positions = self.tick();
            let accepted = positions
                .into_iter()
                .map(|position| sink.ingest(position))
                .filter(UpsertOutcome::is_accepted)
                .count();

            if self.ticks == 1 || self.ticks % LOG_EVERY_TICKS == 0 {
                debug!("[Mock] Tick {}: {} positions accepted", self.ticks, accepted);
            }

            if !interruptible_sleep(&running, self.interval).await {
                break;
            }
        }

        info!("[Mock] Stopped after {} ticks", self.ticks);
    }
}

fn between(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    if low < high {
        rng.gen_range(low..=high)
    } else {
        low
    }
}

/// Dead-reckon `hours` ahead, bouncing off the edges of `area`
fn advance(vessel: &mut MockVessel, hours: f64, area: &BoundingBox) {
    let distance_deg = vessel.sog * hours / 60.0;
    let course = vessel.cog.to_radians();
    let lat_scale = vessel.latitude.to_radians().cos().max(0.01);

    let mut latitude = vessel.latitude + distance_deg * course.cos();
    let mut longitude = vessel.longitude + distance_deg * course.sin() / lat_scale;

    if latitude > area.max_lat || latitude < area.min_lat {
        let edge = if latitude > area.max_lat { area.max_lat } else { area.min_lat };
        latitude = 2.0 * edge - latitude;
        vessel.cog = (180.0 - vessel.cog).rem_euclid(360.0);
    }
    if longitude > area.max_lon || longitude < area.min_lon {
        let edge = if longitude > area.max_lon { area.max_lon } else { area.min_lon };
        longitude = 2.0 * edge - longitude;
        vessel.cog = (360.0 - vessel.cog).rem_euclid(360.0);
    }

    vessel.latitude = latitude.clamp(area.min_lat, area.max_lat);
    vessel.longitude = longitude.clamp(area.min_lon, area.max_lon);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn config(seed: u64) -> MockConfig {
        MockConfig {
            enabled: true,
            vessel_count: 5,
            seed,
            interval_ms: 10,
            ..MockConfig::default()
        }
    }

    #[derive(Default)]
    struct CountingSink {
        positions: Mutex<usize>,
        infos: Mutex<usize>,
    }

    impl PositionSink for CountingSink {
        fn ingest(&self, _position: VesselPosition) -> UpsertOutcome {
            let mut count = self.positions.lock();
            *count += 1;
            UpsertOutcome::Inserted { seq: *count as u64 }
        }

        fn ingest_info(&self, _info: VesselInfo) {
            *self.infos.lock() += 1;
        }

        fn reject(&self, _source: PositionSource) {}

        fn last_update_age(&self) -> Option<Duration> {
            None
        }
    }

    #[test]
    fn test_same_seed_same_tracks() {
        let mut a = MockAisFeed::new(&config(7));
        let mut b = MockAisFeed::new(&config(7));

        for _ in 0..10 {
            let pa: Vec<(f64, f64)> = a.tick().iter().map(|p| (p.latitude, p.longitude)).collect();
            let pb: Vec<(f64, f64)> = b.tick().iter().map(|p| (p.latitude, p.longitude)).collect();
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_mmsis_are_distinct_and_tagged_mock() {
        let mut feed = MockAisFeed::new(&config(1));
        let positions = feed.tick();

        assert_eq!(positions.len(), 5);
        let mmsis: Vec<u32> = positions.iter().map(|p| p.mmsi.value()).collect();
        assert_eq!(mmsis, vec![900000001, 900000002, 900000003, 900000004, 900000005]);
        assert!(positions.iter().all(|p| p.source == PositionSource::Mock));
        assert_eq!(positions[0].name.as_deref(), Some("MOCK VESSEL 1"));
    }

    #[test]
    fn test_stays_inside_area() {
        let mut cfg = config(3);
        // A tiny box and a long interval force plenty of bounces
        cfg.area = BoundingBox {
            min_lat: 50.0,
            min_lon: -1.0,
            max_lat: 50.05,
            max_lon: -0.95,
        };
        cfg.interval_ms = 600_000;
        let mut feed = MockAisFeed::new(&cfg);

        for _ in 0..200 {
            for p in feed.tick() {
                assert!(cfg.area.contains(p.latitude, p.longitude), "{:?}", p);
            }
        }
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut feed = MockAisFeed::new(&config(9));
        let first = feed.tick();
        let second = feed.tick();

        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.mmsi, b.mmsi);
            assert!(b.timestamp > a.timestamp);
        }
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let feed = MockAisFeed::new(&config(5));
        let sink = Arc::new(CountingSink::default());
        let running = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(feed.run(sink.clone(), running.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        running.store(false, Ordering::Release);
        task.await.unwrap();

        assert_eq!(*sink.infos.lock(), 5);
        assert!(*sink.positions.lock() >= 5);
    }
}
