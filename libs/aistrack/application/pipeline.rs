//! Ingest pipeline: cache, then fan-out
//!
//! Every source feeds reports through here. The cache decides whether a
//! report is news; accepted ones are published while the cache write lock
//! is still held, so hub order always matches sequence order.

use super::hub::PositionHub;
use crate::domain::{
    PositionSink, PositionSource, PositionUpdate, UpsertOutcome, VesselInfo, VesselPosition,
};
use crate::infrastructure::cache::{PositionCache, SharedPositionCache};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome counters for one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub rejected: u64,
}

impl SourceStats {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted { .. } | UpsertOutcome::Updated { .. } => self.accepted += 1,
            UpsertOutcome::Duplicate => self.duplicates += 1,
            UpsertOutcome::OutOfOrder => self.out_of_order += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub by_source: HashMap<PositionSource, SourceStats>,
    pub static_reports: u64,
}

impl PipelineStats {
    pub fn source(&self, source: PositionSource) -> SourceStats {
        self.by_source.get(&source).copied().unwrap_or_default()
    }

    pub fn total(&self) -> SourceStats {
        self.by_source
            .values()
            .fold(SourceStats::default(), |mut acc, stats| {
                acc.accepted += stats.accepted;
                acc.duplicates += stats.duplicates;
                acc.out_of_order += stats.out_of_order;
                acc.rejected += stats.rejected;
                acc
            })
    }
}

pub struct IngestPipeline {
    cache: SharedPositionCache,
    hub: Arc<PositionHub>,
    stats: Mutex<PipelineStats>,
}

impl IngestPipeline {
    pub fn new(cache: SharedPositionCache, hub: Arc<PositionHub>) -> Self {
        Self {
            cache,
            hub,
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    /// Fresh cache and hub with the given group capacity
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self::new(PositionCache::shared(), Arc::new(PositionHub::new(channel_capacity)))
    }

    pub fn cache(&self) -> SharedPositionCache {
        Arc::clone(&self.cache)
    }

    pub fn hub(&self) -> Arc<PositionHub> {
        Arc::clone(&self.hub)
    }

    /// Offer an already validated position
    pub fn ingest(&self, position: VesselPosition) -> UpsertOutcome {
        let source = position.source;
        let mmsi = position.mmsi;

        let outcome = {
            let mut cache = self.cache.write();
            let outcome = cache.upsert(position);
            if let Some(seq) = outcome.accepted_seq() {
                // The cache may have attached a known name
                if let Some(stored) = cache.get(mmsi) {
                    self.hub.publish(PositionUpdate {
                        seq,
                        position: stored.clone(),
                    });
                }
            }
            outcome
        };

        self.stats.lock().by_source.entry(source).or_default().record(outcome);
        outcome
    }

    pub fn ingest_info(&self, info: VesselInfo) {
        let mmsi = info.mmsi;
        if self.cache.write().record_info(info) {
            debug!("[Pipeline] Learned static data for {}", mmsi);
        }
        self.stats.lock().static_reports += 1;
    }

    pub fn reject(&self, source: PositionSource) {
        self.stats.lock().by_source.entry(source).or_default().rejected += 1;
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }
}

impl PositionSink for IngestPipeline {
    fn ingest(&self, position: VesselPosition) -> UpsertOutcome {
        IngestPipeline::ingest(self, position)
    }

    fn ingest_info(&self, info: VesselInfo) {
        IngestPipeline::ingest_info(self, info)
    }

    fn reject(&self, source: PositionSource) {
        IngestPipeline::reject(self, source)
    }

    fn last_update_age(&self) -> Option<Duration> {
        self.cache.read().last_update_age()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::hub::ALL_VESSELS_GROUP;
    use crate::domain::Mmsi;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn report(mmsi: u32, secs: i64, source: PositionSource) -> VesselPosition {
        VesselPosition::new(Mmsi::new(mmsi).unwrap(), 1.0, 2.0, at(secs), source).unwrap()
    }

    #[test]
    fn test_accepted_reports_are_published_in_seq_order() {
        let pipeline = IngestPipeline::with_capacity(16);
        let mut rx = pipeline.hub().subscribe(ALL_VESSELS_GROUP);

        pipeline.ingest(report(1, 10, PositionSource::Stream));
        pipeline.ingest(report(2, 10, PositionSource::Stream));
        pipeline.ingest(report(1, 20, PositionSource::Stream));

        let seqs: Vec<u64> = (0..3).map(|_| rx.try_recv().unwrap().seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_duplicates_and_stale_reports_are_not_published() {
        let pipeline = IngestPipeline::with_capacity(16);
        let mut rx = pipeline.hub().subscribe(ALL_VESSELS_GROUP);

        assert!(pipeline.ingest(report(1, 10, PositionSource::Stream)).is_accepted());
        assert_eq!(
            pipeline.ingest(report(1, 10, PositionSource::Poll)),
            UpsertOutcome::Duplicate
        );
        assert_eq!(
            pipeline.ingest(report(1, 5, PositionSource::Poll)),
            UpsertOutcome::OutOfOrder
        );
        pipeline.reject(PositionSource::Poll);

        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert!(rx.try_recv().is_err());

        let stats = pipeline.stats();
        assert_eq!(stats.source(PositionSource::Stream).accepted, 1);
        let poll = stats.source(PositionSource::Poll);
        assert_eq!((poll.duplicates, poll.out_of_order, poll.rejected), (1, 1, 1));
        assert_eq!(stats.total().accepted, 1);
    }

    #[test]
    fn test_published_position_carries_known_name() {
        let pipeline = IngestPipeline::with_capacity(16);
        let mmsi = Mmsi::new(3).unwrap();
        pipeline.ingest_info(VesselInfo::new(mmsi).with_name("SEA WITCH"));

        let mut rx = pipeline.hub().subscribe(ALL_VESSELS_GROUP);
        pipeline.ingest(report(3, 1, PositionSource::Stream));

        let update = rx.try_recv().unwrap();
        assert_eq!(update.position.name.as_deref(), Some("SEA WITCH"));
        assert_eq!(pipeline.stats().static_reports, 1);
    }

    #[test]
    fn test_sink_reports_last_update_age() {
        let pipeline = IngestPipeline::with_capacity(4);
        let sink: &dyn PositionSink = &pipeline;
        assert!(sink.last_update_age().is_none());

        sink.ingest(report(1, 1, PositionSource::Mock));
        assert!(sink.last_update_age().unwrap() < Duration::from_secs(5));
    }
}
