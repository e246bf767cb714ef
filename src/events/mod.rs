//! Event fan-out
//!
//! Chain events land in hourly partitions. The poller watches for a new
//! partition and pushes its events to every connected websocket client
//! through the broadcaster.

mod poller;

pub use poller::{EventPoller, EventPollerConfig};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;

use crate::types::TokenEvent;

/// Hour partition label, e.g. "2024-05-01 13"
pub fn hour_partition(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H").to_string()
}

/// Channel for broadcasting event batches to websocket clients
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send one batch as a JSON array; returns how many clients got it.
    pub fn broadcast_events(&self, events: &[TokenEvent]) -> usize {
        match serde_json::to_string(events) {
            // no receivers is fine
            Ok(json) => self.tx.send(json).unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Failed to encode event batch");
                0
            }
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
