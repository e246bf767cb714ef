//! Polls the event source for new hourly partitions

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{hour_partition, EventBroadcaster};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::persistence::EventSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPollerConfig {
    pub interval: Duration,
    pub chains: Vec<String>,
    pub tokens: Vec<String>,
}

pub struct EventPoller {
    source: Arc<dyn EventSource>,
    broadcaster: EventBroadcaster,
    config: EventPollerConfig,
    /// Last partition already pushed
    last_pt: Mutex<String>,
}

impl EventPoller {
    /// Starts one hour back so the current partition is published on the
    /// first tick.
    pub fn new(
        source: Arc<dyn EventSource>,
        broadcaster: EventBroadcaster,
        clock: &dyn Clock,
        config: EventPollerConfig,
    ) -> Self {
        let start = hour_partition(clock.now() - ChronoDuration::hours(1));
        Self {
            source,
            broadcaster,
            config,
            last_pt: Mutex::new(start),
        }
    }

    pub async fn last_pt(&self) -> String {
        self.last_pt.lock().await.clone()
    }

    /// Publish the newest partition if it is newer than the last one seen.
    /// Returns the number of events sent.
    pub async fn poll_once(&self) -> Result<usize, StoreError> {
        let max_pt = match self.source.max_pt(&self.config.chains).await? {
            Some(pt) => pt,
            None => return Ok(0),
        };

        let mut last_pt = self.last_pt.lock().await;
        if max_pt.as_str() <= last_pt.as_str() {
            return Ok(0);
        }

        let events = self
            .source
            .events_at(&max_pt, &self.config.chains, &self.config.tokens)
            .await?;
        *last_pt = max_pt;

        if events.is_empty() {
            debug!(pt = %last_pt, "New partition has no tracked events");
            return Ok(0);
        }

        let clients = self.broadcaster.broadcast_events(&events);
        info!(
            pt = %last_pt,
            events = events.len(),
            clients,
            "📡 Published token events"
        );
        Ok(events.len())
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.poll_once().await {
                    warn!(error = %e, "Event poll failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::InMemoryStore;
    use crate::types::TokenEvent;
    use chrono::{TimeZone, Utc};

    fn event(pt: &str, token: &str) -> TokenEvent {
        TokenEvent {
            token_address: token.to_string(),
            chain: "eth".to_string(),
            event_id: format!("{token}-{pt}"),
            event_type: "flow".to_string(),
            event: "inflow".to_string(),
            event_detail: "{}".to_string(),
            pt: pt.to_string(),
            base_score: "1".to_string(),
        }
    }

    fn poller(store: Arc<InMemoryStore>, broadcaster: EventBroadcaster) -> EventPoller {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap().timestamp();
        let clock = ManualClock::new(start);
        EventPoller::new(
            store,
            broadcaster,
            &clock,
            EventPollerConfig {
                interval: Duration::from_secs(10),
                chains: vec!["eth".to_string()],
                tokens: vec!["0xa".to_string()],
            },
        )
    }

    #[tokio::test]
    async fn starts_one_hour_back() {
        let p = poller(Arc::new(InMemoryStore::new()), EventBroadcaster::default());
        assert_eq!(p.last_pt().await, "2024-05-01 11");
    }

    #[tokio::test]
    async fn publishes_each_new_partition_once() {
        let store = Arc::new(InMemoryStore::new());
        let broadcaster = EventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        let p = poller(store.clone(), broadcaster);

        store.add_event(event("2024-05-01 11", "0xa")).await;
        assert_eq!(p.poll_once().await.unwrap(), 0);

        store.add_event(event("2024-05-01 12", "0xa")).await;
        store.add_event(event("2024-05-01 12", "0xuntracked")).await;
        assert_eq!(p.poll_once().await.unwrap(), 1);
        assert_eq!(p.last_pt().await, "2024-05-01 12");

        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("0xa-2024-05-01 12"));
        assert!(!msg.contains("0xuntracked"));

        // same partition again is not re-sent
        assert_eq!(p.poll_once().await.unwrap(), 0);
    }
}
