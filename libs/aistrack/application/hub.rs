//! Pub/sub fan-out of accepted positions
//!
//! Groups are bounded broadcast channels keyed by name: [`ALL_VESSELS_GROUP`]
//! carries every update and `vessel.<mmsi>` carries one vessel. A receiver
//! that falls more than `capacity` updates behind gets `Lagged(n)` on its
//! next `recv` and is expected to resync from a cache snapshot.

use crate::domain::{Mmsi, PositionUpdate};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Group that receives every accepted position
pub const ALL_VESSELS_GROUP: &str = "vessels";

/// Group name for a single vessel
pub fn vessel_group(mmsi: Mmsi) -> String {
    format!("vessel.{}", mmsi)
}

pub struct PositionHub {
    groups: DashMap<String, broadcast::Sender<Arc<PositionUpdate>>>,
    capacity: usize,
}

impl PositionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Send to the all-vessels group and the vessel's own group
    ///
    /// Only groups that already exist are touched. Returns how many
    /// receivers got the update; zero is fine.
    pub fn publish(&self, update: PositionUpdate) -> usize {
        let update = Arc::new(update);
        let own_group = vessel_group(update.position.mmsi);

        [ALL_VESSELS_GROUP, own_group.as_str()]
            .iter()
            .filter_map(|group| self.groups.get(*group))
            .map(|sender| sender.send(Arc::clone(&update)).unwrap_or(0))
            .sum()
    }

    /// Receiver for `group`, created on first use
    pub fn subscribe(&self, group: &str) -> broadcast::Receiver<Arc<PositionUpdate>> {
        if let Some(sender) = self.groups.get(group) {
            return sender.subscribe();
        }

        let sender = self
            .groups
            .entry(group.to_string())
            .or_insert_with(|| {
                debug!("[Hub] Created group {}", group);
                broadcast::channel(self.capacity).0
            });
        sender.subscribe()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn subscriber_count(&self, group: &str) -> usize {
        self.groups
            .get(group)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Drop groups nobody listens to; returns how many went
    pub fn prune(&self) -> usize {
        let before = self.groups.len();
        self.groups.retain(|_, sender| sender.receiver_count() > 0);
        let removed = before - self.groups.len();
        if removed > 0 {
            debug!("[Hub] Pruned {} idle groups", removed);
        }
        removed
    }
}
