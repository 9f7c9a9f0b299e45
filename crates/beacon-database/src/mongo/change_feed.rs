//! Session change notifications.
//!
//! A change stream is used when the deployment supports one (replica sets and
//! sharded clusters); standalone servers fall back to a fixed polling tick.

use std::time::Duration;

use beacon_entities::SessionDocument;
use bson::Document;
use futures::stream::BoxStream;
use futures::StreamExt;
use mongodb::Collection;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub(crate) async fn subscribe(
    sessions: Collection<SessionDocument>,
    poll_interval: Duration,
) -> BoxStream<'static, ()> {
    // only the fact of a change matters, not the document shape
    let mut changes = match sessions.clone_with_type::<Document>().watch().await {
        Ok(changes) => changes,
        Err(e) => {
            debug!("Change stream unavailable, polling instead: {}", e);
            return polling(poll_interval);
        }
    };

    Box::pin(async_stream::stream! {
        while let Some(event) = changes.next().await {
            match event {
                Ok(_) => {
                    yield ();
                }
                Err(e) => {
                    warn!("Change stream failed, switching to polling: {}", e);
                    break;
                }
            }
        }

        let mut ticks = polling(poll_interval);
        while let Some(tick) = ticks.next().await {
            yield tick;
        }
    })
}

/// Emits once per interval, starting one interval from now
pub(crate) fn polling(interval: Duration) -> BoxStream<'static, ()> {
    Box::pin(async_stream::stream! {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            yield ();
        }
    })
}
