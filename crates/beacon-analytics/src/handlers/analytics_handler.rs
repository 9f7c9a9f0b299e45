use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use beacon_core::{ApiError, ErrorEnvelope};
use beacon_entities::EventKind;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};
use utoipa::OpenApi;

use crate::services::{AnalyticsService, FeedEvent, LiveFeedService};
use crate::types::{
    ActionFeedItem, ActionsResponse, Breakdown, CampaignDetailQuery, CampaignDetailResponse,
    CampaignRow, CampaignsOverviewResponse, DevicesResponse, GeoPointsResponse, GeoResponse,
    LiveSnapshot, LocationRow, MapPoint, OverviewCharts, OverviewResponse, SectionTime, SourceRow,
    TopLocation, Totals,
};

pub struct AppState {
    pub analytics_service: Arc<AnalyticsService>,
    pub live_feed: Arc<LiveFeedService>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_overview,
        get_geo,
        get_geo_points,
        get_devices,
        get_actions,
        get_campaigns_overview,
        get_campaign_detail,
        stream_overview
    ),
    components(schemas(
        OverviewResponse,
        OverviewCharts,
        Totals,
        SectionTime,
        Breakdown,
        TopLocation,
        LiveSnapshot,
        GeoResponse,
        LocationRow,
        GeoPointsResponse,
        MapPoint,
        DevicesResponse,
        ActionsResponse,
        ActionFeedItem,
        EventKind,
        CampaignsOverviewResponse,
        CampaignRow,
        SourceRow,
        CampaignDetailResponse,
        ErrorEnvelope,
    )),
    tags(
        (name = "Analytics", description = "Dashboard aggregates and live feed")
    )
)]
pub struct AnalyticsApiDoc;

/// Headline totals and dashboard charts
#[utoipa::path(
    get,
    path = "/analytics/overview",
    responses(
        (status = 200, description = "Overview aggregates", body = OverviewResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Analytics"
)]
pub async fn get_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OverviewResponse>, ApiError> {
    Ok(Json(state.analytics_service.overview().await?))
}

/// Sessions and unique users per location
#[utoipa::path(
    get,
    path = "/analytics/geo",
    responses(
        (status = 200, description = "Location table", body = GeoResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Analytics"
)]
pub async fn get_geo(State(state): State<Arc<AppState>>) -> Result<Json<GeoResponse>, ApiError> {
    let geo = state.analytics_service.locations().await?;
    Ok(Json(GeoResponse { ok: true, geo }))
}

/// Coordinate clusters for the map view
#[utoipa::path(
    get,
    path = "/analytics/geo/points",
    responses(
        (status = 200, description = "Map points", body = GeoPointsResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Analytics"
)]
pub async fn get_geo_points(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GeoPointsResponse>, ApiError> {
    let points = state.analytics_service.geo_points().await?;
    Ok(Json(GeoPointsResponse { ok: true, points }))
}

#[utoipa::path(
    get,
    path = "/analytics/devices",
    responses(
        (status = 200, description = "Sessions per device type", body = DevicesResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Analytics"
)]
pub async fn get_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DevicesResponse>, ApiError> {
    let devices = state.analytics_service.devices().await?;
    Ok(Json(DevicesResponse { ok: true, devices }))
}

/// Most recent interaction events, newest first
#[utoipa::path(
    get,
    path = "/analytics/actions",
    responses(
        (status = 200, description = "Recent actions", body = ActionsResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Analytics"
)]
pub async fn get_actions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActionsResponse>, ApiError> {
    let actions = state.analytics_service.recent_actions().await?;
    Ok(Json(ActionsResponse { ok: true, actions }))
}

#[utoipa::path(
    get,
    path = "/analytics/campaigns/overview",
    responses(
        (status = 200, description = "Per-campaign and per-source totals", body = CampaignsOverviewResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Analytics"
)]
pub async fn get_campaigns_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CampaignsOverviewResponse>, ApiError> {
    Ok(Json(state.analytics_service.campaigns_overview().await?))
}

/// Totals, devices and locations for one campaign
#[utoipa::path(
    get,
    path = "/analytics/campaigns/detail",
    params(CampaignDetailQuery),
    responses(
        (status = 200, description = "Campaign drill-down", body = CampaignDetailResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Analytics"
)]
pub async fn get_campaign_detail(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CampaignDetailQuery>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    let key = query.key();
    debug!("Campaign detail for {}/{}", key.source, key.campaign);
    Ok(Json(state.analytics_service.campaign_detail(&key).await?))
}

/// Server-sent events: `overview` snapshots on change and `ping` heartbeats
#[utoipa::path(
    get,
    path = "/analytics/stream",
    responses(
        (status = 200, description = "Live event stream", content_type = "text/event-stream", body = LiveSnapshot)
    ),
    tag = "Analytics"
)]
pub async fn stream_overview(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let event_stream = state
        .live_feed
        .events()
        .filter_map(|event| async move { to_sse_event(event).map(Ok) });

    Sse::new(event_stream)
}

fn to_sse_event(event: FeedEvent) -> Option<Event> {
    match event {
        FeedEvent::Snapshot(snapshot) => {
            match Event::default().event("overview").json_data(&snapshot) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Failed to encode live snapshot: {}", e);
                    None
                }
            }
        }
        FeedEvent::Heartbeat => Some(Event::default().event("ping").data("{}")),
    }
}

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/overview", get(get_overview))
        .route("/analytics/geo", get(get_geo))
        .route("/analytics/geo/points", get(get_geo_points))
        .route("/analytics/devices", get(get_devices))
        .route("/analytics/actions", get(get_actions))
        .route("/analytics/campaigns/overview", get(get_campaigns_overview))
        .route("/analytics/campaigns/detail", get(get_campaign_detail))
        .route("/analytics/stream", get(stream_overview))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use beacon_config::AnalyticsSettings;
    use beacon_database::{MemoryStore, SessionStore};
    use beacon_entities::{
        ActionRecord, DeviceProfile, DeviceType, GeoMethod, GeoProfile, SessionStart, Utm,
        VariantRef,
    };
    use chrono::Utc;
    use serde_json::Value;

    fn start(session_id: &str, ip: &str, source: Option<&str>) -> SessionStart {
        SessionStart {
            session_id: session_id.into(),
            utm: Utm {
                source: source.map(str::to_string),
                campaign: source.map(|_| "launch".to_string()),
                ..Utm::default()
            },
            page_url: None,
            referrer: None,
            variant: VariantRef::default(),
            device: DeviceProfile {
                device_type: DeviceType::Desktop,
                ..DeviceProfile::default()
            },
            user_agent: "test".into(),
            ip: Some(ip.into()),
            geo: GeoProfile {
                city: Some("Lisbon".into()),
                country: Some("Portugal".into()),
                lat: Some(38.72),
                lon: Some(-9.14),
                method: GeoMethod::Ip,
                ..GeoProfile::unresolved()
            },
        }
    }

    async fn server() -> TestServer {
        let store = Arc::new(MemoryStore::new());
        store
            .start_session(start("s-news-0001", "198.51.100.7", Some("newsletter")))
            .await
            .unwrap();
        store
            .start_session(start("s-direct-001", "198.51.100.8", None))
            .await
            .unwrap();
        store
            .append_actions(
                "s-news-0001",
                vec![ActionRecord {
                    section: "contact".into(),
                    event: EventKind::CtaClick,
                    time_spent: None,
                    timestamp: Utc::now(),
                }],
            )
            .await
            .unwrap();

        let analytics_service = Arc::new(AnalyticsService::new(
            store.clone(),
            AnalyticsSettings::default(),
        ));
        let live_feed = Arc::new(LiveFeedService::new(
            analytics_service.clone(),
            store,
            Duration::from_secs(15),
        ));
        let app = configure_routes().with_state(Arc::new(AppState {
            analytics_service,
            live_feed,
        }));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn test_overview_payload_shape() {
        let server = server().await;

        let response = server.get("/analytics/overview").await;

        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["ok"], true);
        assert_eq!(body["totals"]["sessions"], 2);
        assert_eq!(body["totals"]["uniqueUsers"], 2);
        assert_eq!(body["totals"]["activeUsers30m"], 2);
        assert_eq!(body["totals"]["ctaClicks"], 1);
        assert!(body["updatedAt"].as_str().unwrap().ends_with('Z'));
        assert_eq!(body["charts"]["geoTop"][0]["location"], "Lisbon, Portugal");
    }

    #[tokio::test]
    async fn test_geo_devices_and_actions() {
        let server = server().await;

        let geo: Value = server.get("/analytics/geo").await.json();
        assert_eq!(geo["geo"][0]["sessions"], 2);

        let points: Value = server.get("/analytics/geo/points").await.json();
        assert_eq!(points["points"].as_array().unwrap().len(), 1);
        assert_eq!(points["points"][0]["sessions"], 2);

        let devices: Value = server.get("/analytics/devices").await.json();
        assert_eq!(devices["devices"][0]["label"], "desktop");
        assert_eq!(devices["devices"][0]["count"], 2);

        let actions: Value = server.get("/analytics/actions").await.json();
        assert_eq!(actions["actions"][0]["sessionId"], "s-news-0001");
        assert_eq!(actions["actions"][0]["event"], "CTA_Click");
    }

    #[tokio::test]
    async fn test_campaign_detail_defaults_to_direct() {
        let server = server().await;

        let detail: Value = server.get("/analytics/campaigns/detail").await.json();
        assert_eq!(detail["head"]["source"], "direct");
        assert_eq!(detail["head"]["campaign"], "(none)");
        assert_eq!(detail["head"]["sessions"], 1);

        let newsletter: Value = server
            .get("/analytics/campaigns/detail")
            .add_query_param("source", "newsletter")
            .add_query_param("campaign", "launch")
            .await
            .json();
        assert_eq!(newsletter["head"]["ctaClicks"], 1);
        assert_eq!(newsletter["head"]["ctr"], 1.0);
    }

    #[tokio::test]
    async fn test_campaigns_overview_groups_sources() {
        let server = server().await;

        let body: Value = server.get("/analytics/campaigns/overview").await.json();
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);
        assert_eq!(body["bySource"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_heartbeat_maps_to_ping() {
        assert!(to_sse_event(FeedEvent::Heartbeat).is_some());
    }
}
