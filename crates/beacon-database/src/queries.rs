//! Aggregation row shapes shared by every store implementation

use beacon_core::UtcDateTime;
use beacon_entities::{EventKind, SessionDocument};
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::Deserialize;

/// Page sections reported individually in campaign and variant views
pub const TRACKED_SECTIONS: [&str; 3] = ["hero", "services", "contact"];

pub const DIRECT_SOURCE: &str = "direct";
pub const NO_CAMPAIGN: &str = "(none)";
pub const UNKNOWN_DEVICE: &str = "unknown";
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// A `(source, campaign)` pair after defaulting missing values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CampaignKey {
    pub source: String,
    pub campaign: String,
}

impl CampaignKey {
    pub fn new(source: impl Into<String>, campaign: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            campaign: campaign.into(),
        }
    }

    pub fn of(session: &SessionDocument) -> Self {
        Self::new(
            session
                .utm_source
                .clone()
                .unwrap_or_else(|| DIRECT_SOURCE.to_string()),
            session
                .utm_campaign
                .clone()
                .unwrap_or_else(|| NO_CAMPAIGN.to_string()),
        )
    }

    pub fn matches(&self, session: &SessionDocument) -> bool {
        session.utm_source.as_deref().unwrap_or(DIRECT_SOURCE) == self.source
            && session.utm_campaign.as_deref().unwrap_or(NO_CAMPAIGN) == self.campaign
    }
}

/// How sessions are bucketed for per-group totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// One row per `(source, campaign)`
    SourceCampaign,
    /// One row per source
    Source,
    /// One row per stored variant id, including sessions without one
    Variant,
    /// A single row for everything in scope
    Overall,
}

/// Per-group session totals; key fields are filled according to the grouping
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTotals {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub variant_name: Option<String>,
    pub sessions: i64,
    /// Distinct non-empty IPs
    pub users: i64,
    pub cta_clicks: i64,
    /// Sum of every `SectionTime` duration
    pub total_time: f64,
    pub hero_time: f64,
    pub services_time: f64,
    pub contact_time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewTotals {
    pub sessions: i64,
    pub unique_users: i64,
    pub active_users: i64,
    pub cta_clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAverage {
    pub section: String,
    pub avg_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStats {
    pub location: String,
    pub sessions: i64,
    pub unique_users: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub sessions: i64,
    pub users: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAction {
    pub session_id: String,
    pub section: String,
    pub event: EventKind,
    #[serde(default)]
    pub time_spent: Option<f64>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: UtcDateTime,
}
