//! Live dashboard feed: a snapshot on connect, another after every store
//! change, and periodic heartbeats so idle proxies keep the connection open.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use beacon_database::ChangeFeed;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::AnalyticsService;
use crate::types::LiveSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Snapshot(LiveSnapshot),
    Heartbeat,
}

enum Wake {
    Heartbeat,
    Changed,
    Closed,
}

pub struct LiveFeedService {
    analytics: Arc<AnalyticsService>,
    changes: Arc<dyn ChangeFeed>,
    heartbeat_interval: Duration,
}

impl LiveFeedService {
    pub fn new(
        analytics: Arc<AnalyticsService>,
        changes: Arc<dyn ChangeFeed>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            analytics,
            changes,
            heartbeat_interval,
        }
    }

    /// Events for one subscriber. The subscription and timers live inside the
    /// returned stream and are released when it is dropped.
    pub fn events(&self) -> BoxStream<'static, FeedEvent> {
        let analytics = self.analytics.clone();
        let changes = self.changes.clone();
        let heartbeat_every = self.heartbeat_interval;

        Box::pin(stream! {
            if let Some(snapshot) = snapshot(&analytics).await {
                yield FeedEvent::Snapshot(snapshot);
            }

            let mut updates = changes.subscribe().await;
            let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let wake = tokio::select! {
                    _ = heartbeat.tick() => Wake::Heartbeat,
                    change = updates.next() => match change {
                        Some(()) => Wake::Changed,
                        None => Wake::Closed,
                    },
                };

                match wake {
                    Wake::Heartbeat => {
                        yield FeedEvent::Heartbeat;
                    }
                    Wake::Changed => {
                        if let Some(snapshot) = snapshot(&analytics).await {
                            yield FeedEvent::Snapshot(snapshot);
                        }
                    }
                    Wake::Closed => {
                        debug!("Change feed closed, ending live stream");
                        break;
                    }
                }
            }
        })
    }
}

/// Failed snapshots are skipped; the next change tries again
async fn snapshot(analytics: &AnalyticsService) -> Option<LiveSnapshot> {
    match analytics.live_snapshot().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            error!("Failed to build live snapshot: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_config::AnalyticsSettings;
    use beacon_database::{MemoryStore, SessionStore};
    use beacon_entities::{DeviceProfile, GeoProfile, SessionStart, Utm, VariantRef};
    use tokio::time::timeout;

    fn feed(store: Arc<MemoryStore>, heartbeat: Duration) -> LiveFeedService {
        let analytics = Arc::new(AnalyticsService::new(
            store.clone(),
            AnalyticsSettings::default(),
        ));
        LiveFeedService::new(analytics, store, heartbeat)
    }

    fn start(session_id: &str) -> SessionStart {
        SessionStart {
            session_id: session_id.into(),
            utm: Utm::default(),
            page_url: None,
            referrer: None,
            variant: VariantRef::default(),
            device: DeviceProfile::default(),
            user_agent: String::new(),
            ip: Some("203.0.113.50".into()),
            geo: GeoProfile::unresolved(),
        }
    }

    async fn next(events: &mut BoxStream<'static, FeedEvent>) -> FeedEvent {
        timeout(Duration::from_secs(2), events.next())
            .await
            .expect("feed stalled")
            .expect("feed ended")
    }

    #[tokio::test]
    async fn test_snapshot_on_connect_and_after_writes() {
        let store = Arc::new(MemoryStore::new());
        let feed = feed(store.clone(), Duration::from_secs(60));
        let mut events = feed.events();

        match next(&mut events).await {
            FeedEvent::Snapshot(snapshot) => assert_eq!(snapshot.totals.sessions, 0),
            other => panic!("expected snapshot, got {:?}", other),
        }

        // Let the stream subscribe before writing
        tokio::task::yield_now().await;
        let pending = tokio::spawn({
            let store = store.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.start_session(start("s-live-0001")).await.unwrap();
            }
        });

        match next(&mut events).await {
            FeedEvent::Snapshot(snapshot) => {
                assert_eq!(snapshot.totals.sessions, 1);
                assert_eq!(snapshot.totals.unique_users, 1);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeats_when_idle() {
        let store = Arc::new(MemoryStore::new());
        let feed = feed(store, Duration::from_millis(20));
        let mut events = feed.events();

        assert!(matches!(next(&mut events).await, FeedEvent::Snapshot(_)));
        assert_eq!(next(&mut events).await, FeedEvent::Heartbeat);
        assert_eq!(next(&mut events).await, FeedEvent::Heartbeat);
    }
}
