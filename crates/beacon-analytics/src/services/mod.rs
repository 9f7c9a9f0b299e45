mod analytics_service;
mod live_feed;

pub use analytics_service::{AnalyticsError, AnalyticsService};
pub use live_feed::{FeedEvent, LiveFeedService};
