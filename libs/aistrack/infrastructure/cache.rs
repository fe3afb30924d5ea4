//! Last known position per vessel
//!
//! The cache is the single source of truth for "where is every vessel now".
//! It also owns the update sequence: every accepted report takes the next
//! sequence number, which lets relay sessions stitch a snapshot and the live
//! stream together without gaps or duplicates.

use crate::domain::{Mmsi, UpsertOutcome, VesselInfo, VesselPosition};
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Thread-safe handle shared by the pipeline, relay sessions and supervisor
pub type SharedPositionCache = Arc<RwLock<PositionCache>>;

/// Consistent view of the cache at sequence `seq`
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    /// Every update with a higher sequence number happened after this view
    pub seq: u64,
    /// Sorted by MMSI
    pub positions: Vec<VesselPosition>,
}

/// Health counters
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub inserted: u64,
    pub updated: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub evicted: u64,
    latency_sum_ms: i64,
    latency_samples: u64,
}

impl CacheStats {
    pub fn accepted(&self) -> u64 {
        self.inserted + self.updated
    }

    /// Mean delay between report time and arrival, over accepted reports
    pub fn avg_latency_ms(&self) -> f64 {
        if self.latency_samples == 0 {
            0.0
        } else {
            self.latency_sum_ms as f64 / self.latency_samples as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct PositionCache {
    positions: HashMap<Mmsi, VesselPosition>,
    info: HashMap<Mmsi, VesselInfo>,
    seq: u64,
    last_update: Option<Instant>,
    stats: CacheStats,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedPositionCache {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Offer a report
    ///
    /// Newer timestamps replace the cached report, equal ones are duplicates,
    /// older ones are rejected. A report without a name inherits the name
    /// already known for the vessel.
    pub fn upsert(&mut self, mut position: VesselPosition) -> UpsertOutcome {
        if position.name.is_none() {
            position.name = self.known_name(position.mmsi);
        }

        let outcome = match self.positions.get(&position.mmsi) {
            None => UpsertOutcome::Inserted { seq: self.seq + 1 },
            Some(cached) => match position.timestamp.cmp(&cached.timestamp) {
                Ordering::Greater => UpsertOutcome::Updated { seq: self.seq + 1 },
                Ordering::Equal => UpsertOutcome::Duplicate,
                Ordering::Less => UpsertOutcome::OutOfOrder,
            },
        };

        match outcome {
            UpsertOutcome::Inserted { seq } | UpsertOutcome::Updated { seq } => {
                self.seq = seq;
                self.last_update = Some(Instant::now());
                if matches!(outcome, UpsertOutcome::Inserted { .. }) {
                    self.stats.inserted += 1;
                } else {
                    self.stats.updated += 1;
                }
                let latency = (Utc::now() - position.timestamp).num_milliseconds().max(0);
                self.stats.latency_sum_ms = self.stats.latency_sum_ms.saturating_add(latency);
                self.stats.latency_samples += 1;
                self.positions.insert(position.mmsi, position);
            }
            UpsertOutcome::Duplicate => self.stats.duplicates += 1,
            UpsertOutcome::OutOfOrder => {
                self.stats.out_of_order += 1;
                debug!(
                    "Dropping out-of-order report for {} ({})",
                    position.mmsi, position.timestamp
                );
            }
        }

        outcome
    }

    /// Merge static data; returns true for a vessel seen for the first time
    ///
    /// A newly learned name is attached to the cached position in place.
    pub fn record_info(&mut self, info: VesselInfo) -> bool {
        let mmsi = info.mmsi;
        let is_new = match self.info.get_mut(&mmsi) {
            Some(existing) => {
                existing.merge(info);
                false
            }
            None => {
                self.info.insert(mmsi, info);
                true
            }
        };

        if let Some(name) = self.known_name(mmsi) {
            if let Some(position) = self.positions.get_mut(&mmsi) {
                position.name = Some(name);
            }
        }

        is_new
    }

    fn known_name(&self, mmsi: Mmsi) -> Option<String> {
        self.info
            .get(&mmsi)
            .and_then(|info| info.name.clone())
            .or_else(|| self.positions.get(&mmsi).and_then(|p| p.name.clone()))
    }

    pub fn get(&self, mmsi: Mmsi) -> Option<&VesselPosition> {
        self.positions.get(&mmsi)
    }

    pub fn info(&self, mmsi: Mmsi) -> Option<&VesselInfo> {
        self.info.get(&mmsi)
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.snapshot_filtered(None)
    }

    /// Snapshot restricted to `filter` (all vessels when `None`)
    pub fn snapshot_filtered(&self, filter: Option<&HashSet<Mmsi>>) -> CacheSnapshot {
        let mut positions: Vec<VesselPosition> = match filter {
            None => self.positions.values().cloned().collect(),
            Some(wanted) => wanted
                .iter()
                .filter_map(|mmsi| self.positions.get(mmsi).cloned())
                .collect(),
        };
        positions.sort_by_key(|p| p.mmsi);

        CacheSnapshot {
            seq: self.seq,
            positions,
        }
    }

    /// Current sequence number (0 before the first accepted report)
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Drop positions whose report time is older than `max_age`
    pub fn evict_older_than(&mut self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let before = self.positions.len();
        self.positions.retain(|_, position| position.timestamp >= cutoff);

        let removed = before - self.positions.len();
        if removed > 0 {
            debug!("Evicted {} stale positions", removed);
            self.stats.evicted += removed as u64;
        }
        removed
    }

    /// Time since the last accepted report
    pub fn last_update_age(&self) -> Option<Duration> {
        self.last_update.map(|at| at.elapsed())
    }

    /// Whether a report was accepted within `ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.last_update_age().map_or(false, |age| age < ttl)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }
}
