use beacon_core::{iso_millis, UtcDateTime};
use beacon_database::{
    GeoPoint, GroupTotals, LabelCount, LocationStats, RecentAction, SectionAverage,
};
use beacon_entities::EventKind;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub sessions: i64,
    /// Distinct non-empty client addresses
    pub unique_users: i64,
    /// Distinct addresses among sessions written in the last 30 minutes
    #[serde(rename = "activeUsers30m")]
    pub active_users_30m: i64,
    pub cta_clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectionTime {
    #[schema(example = "hero")]
    pub section: String,
    pub avg_seconds: f64,
}

impl From<SectionAverage> for SectionTime {
    fn from(row: SectionAverage) -> Self {
        Self {
            section: row.section,
            avg_seconds: row.avg_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Breakdown {
    #[schema(example = "mobile")]
    pub label: String,
    pub count: i64,
}

impl From<LabelCount> for Breakdown {
    fn from(row: LabelCount) -> Self {
        Self {
            label: row.label,
            count: row.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TopLocation {
    #[schema(example = "Berlin, Germany")]
    pub location: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverviewCharts {
    pub avg_time_by_section: Vec<SectionTime>,
    pub device_breakdown: Vec<Breakdown>,
    pub source_breakdown: Vec<Breakdown>,
    pub geo_top: Vec<TopLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverviewResponse {
    pub ok: bool,
    #[serde(serialize_with = "iso_millis::serialize")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: UtcDateTime,
    pub totals: Totals,
    pub charts: OverviewCharts,
}

/// Payload of each `overview` event on the live feed
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    pub ok: bool,
    #[serde(serialize_with = "iso_millis::serialize")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: UtcDateTime,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationRow {
    pub location: String,
    pub sessions: i64,
    pub unique_users: i64,
}

impl From<LocationStats> for LocationRow {
    fn from(row: LocationStats) -> Self {
        Self {
            location: row.location,
            sessions: row.sessions,
            unique_users: row.unique_users,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GeoResponse {
    pub ok: bool,
    pub geo: Vec<LocationRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MapPoint {
    pub country: Option<String>,
    pub city: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub sessions: i64,
    pub users: i64,
}

impl From<GeoPoint> for MapPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            country: point.country,
            city: point.city,
            lat: point.lat,
            lon: point.lon,
            sessions: point.sessions,
            users: point.users,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GeoPointsResponse {
    pub ok: bool,
    pub points: Vec<MapPoint>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DevicesResponse {
    pub ok: bool,
    pub devices: Vec<Breakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionFeedItem {
    pub session_id: String,
    pub section: String,
    pub event: EventKind,
    pub time_spent: Option<f64>,
    #[serde(serialize_with = "iso_millis::serialize")]
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: UtcDateTime,
}

impl From<RecentAction> for ActionFeedItem {
    fn from(action: RecentAction) -> Self {
        Self {
            session_id: action.session_id,
            section: action.section,
            event: action.event,
            time_spent: action.time_spent,
            timestamp: action.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionsResponse {
    pub ok: bool,
    pub actions: Vec<ActionFeedItem>,
}

fn per_session(value: f64, sessions: i64) -> f64 {
    if sessions > 0 {
        value / sessions as f64
    } else {
        0.0
    }
}

/// Totals for one `(source, campaign)` pair
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRow {
    #[schema(example = "newsletter")]
    pub source: String,
    #[schema(example = "spring-launch")]
    pub campaign: String,
    pub sessions: i64,
    pub users: i64,
    pub cta_clicks: i64,
    pub ctr: f64,
    pub avg_time_per_session: f64,
    pub avg_hero: f64,
    pub avg_services: f64,
    pub avg_contact: f64,
}

impl CampaignRow {
    /// `source` and `campaign` are taken from the arguments; the row's own key
    /// fields are ignored so filtered totals keep the requested labels
    pub fn from_totals(source: String, campaign: String, totals: &GroupTotals) -> Self {
        Self {
            source,
            campaign,
            sessions: totals.sessions,
            users: totals.users,
            cta_clicks: totals.cta_clicks,
            ctr: per_session(totals.cta_clicks as f64, totals.sessions),
            avg_time_per_session: per_session(totals.total_time, totals.sessions),
            avg_hero: per_session(totals.hero_time, totals.sessions),
            avg_services: per_session(totals.services_time, totals.sessions),
            avg_contact: per_session(totals.contact_time, totals.sessions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRow {
    pub source: String,
    pub sessions: i64,
    pub users: i64,
    pub cta_clicks: i64,
    pub ctr: f64,
}

impl SourceRow {
    pub fn from_totals(source: String, totals: &GroupTotals) -> Self {
        Self {
            source,
            sessions: totals.sessions,
            users: totals.users,
            cta_clicks: totals.cta_clicks,
            ctr: per_session(totals.cta_clicks as f64, totals.sessions),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignsOverviewResponse {
    pub ok: bool,
    pub rows: Vec<CampaignRow>,
    pub by_source: Vec<SourceRow>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CampaignDetailResponse {
    pub ok: bool,
    /// Null when no session belongs to the campaign
    pub head: Option<CampaignRow>,
    pub devices: Vec<Breakdown>,
    pub geo: Vec<LocationRow>,
}
