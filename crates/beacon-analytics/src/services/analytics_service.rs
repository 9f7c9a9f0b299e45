use std::sync::Arc;

use beacon_config::AnalyticsSettings;
use beacon_core::problem::internal_server_error;
use beacon_core::ApiError;
use beacon_database::{
    AnalyticsStore, CampaignKey, Grouping, StoreError, DIRECT_SOURCE, NO_CAMPAIGN,
};
use chrono::Utc;
use thiserror::Error;
use tracing::error;

use crate::types::{
    ActionFeedItem, Breakdown, CampaignDetailResponse, CampaignRow, CampaignsOverviewResponse,
    LiveSnapshot, LocationRow, MapPoint, OverviewCharts, OverviewResponse, SectionTime, SourceRow,
    TopLocation, Totals,
};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        error!("Analytics query failed: {}", err);
        internal_server_error()
    }
}

/// Read-only dashboards over the session collection
pub struct AnalyticsService {
    store: Arc<dyn AnalyticsStore>,
    settings: AnalyticsSettings,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn AnalyticsStore>, settings: AnalyticsSettings) -> Self {
        Self { store, settings }
    }

    async fn totals(&self) -> Result<Totals, AnalyticsError> {
        let window = chrono::Duration::from_std(self.settings.active_window)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let totals = self.store.overview_totals(Utc::now() - window).await?;

        Ok(Totals {
            sessions: totals.sessions,
            unique_users: totals.unique_users,
            active_users_30m: totals.active_users,
            cta_clicks: totals.cta_clicks,
        })
    }

    /// Headline totals plus every chart
    pub async fn overview(&self) -> Result<OverviewResponse, AnalyticsError> {
        let (totals, sections, devices, sources, locations) = tokio::try_join!(
            self.totals(),
            async { Ok::<_, AnalyticsError>(self.store.average_time_by_section().await?) },
            async { Ok::<_, AnalyticsError>(self.store.device_breakdown(None).await?) },
            async { Ok::<_, AnalyticsError>(self.store.source_breakdown().await?) },
            async {
                Ok::<_, AnalyticsError>(
                    self.store
                        .location_stats(None, Some(self.settings.top_locations_limit))
                        .await?,
                )
            },
        )?;

        Ok(OverviewResponse {
            ok: true,
            updated_at: Utc::now(),
            totals,
            charts: OverviewCharts {
                avg_time_by_section: sections.into_iter().map(SectionTime::from).collect(),
                device_breakdown: devices.into_iter().map(Breakdown::from).collect(),
                source_breakdown: sources.into_iter().map(Breakdown::from).collect(),
                geo_top: locations
                    .into_iter()
                    .map(|row| TopLocation {
                        location: row.location,
                        count: row.sessions,
                    })
                    .collect(),
            },
        })
    }

    /// Totals only, as pushed on the live feed
    pub async fn live_snapshot(&self) -> Result<LiveSnapshot, AnalyticsError> {
        Ok(LiveSnapshot {
            ok: true,
            updated_at: Utc::now(),
            totals: self.totals().await?,
        })
    }

    pub async fn locations(&self) -> Result<Vec<LocationRow>, AnalyticsError> {
        let rows = self.store.location_stats(None, None).await?;
        Ok(rows.into_iter().map(LocationRow::from).collect())
    }

    pub async fn geo_points(&self) -> Result<Vec<MapPoint>, AnalyticsError> {
        let points = self.store.geo_points().await?;
        Ok(points.into_iter().map(MapPoint::from).collect())
    }

    pub async fn devices(&self) -> Result<Vec<Breakdown>, AnalyticsError> {
        let rows = self.store.device_breakdown(None).await?;
        Ok(rows.into_iter().map(Breakdown::from).collect())
    }

    /// Most recent events across every session, newest first
    pub async fn recent_actions(&self) -> Result<Vec<ActionFeedItem>, AnalyticsError> {
        let actions = self
            .store
            .recent_actions(self.settings.recent_actions_limit)
            .await?;
        Ok(actions.into_iter().map(ActionFeedItem::from).collect())
    }

    pub async fn campaigns_overview(&self) -> Result<CampaignsOverviewResponse, AnalyticsError> {
        let (campaigns, sources) = tokio::try_join!(
            self.store.group_totals(Grouping::SourceCampaign, None),
            self.store.group_totals(Grouping::Source, None),
        )?;

        let rows = campaigns
            .iter()
            .map(|row| {
                CampaignRow::from_totals(
                    row.source.clone().unwrap_or_else(|| DIRECT_SOURCE.to_string()),
                    row.campaign.clone().unwrap_or_else(|| NO_CAMPAIGN.to_string()),
                    row,
                )
            })
            .collect();
        let by_source = sources
            .iter()
            .map(|row| {
                SourceRow::from_totals(
                    row.source.clone().unwrap_or_else(|| DIRECT_SOURCE.to_string()),
                    row,
                )
            })
            .collect();

        Ok(CampaignsOverviewResponse {
            ok: true,
            rows,
            by_source,
        })
    }

    /// Head totals, devices and top locations restricted to one campaign
    pub async fn campaign_detail(
        &self,
        key: &CampaignKey,
    ) -> Result<CampaignDetailResponse, AnalyticsError> {
        let (head, devices, geo) = tokio::try_join!(
            self.store.group_totals(Grouping::Overall, Some(key)),
            self.store.device_breakdown(Some(key)),
            self.store
                .location_stats(Some(key), Some(self.settings.campaign_locations_limit)),
        )?;

        Ok(CampaignDetailResponse {
            ok: true,
            head: head
                .first()
                .filter(|totals| totals.sessions > 0)
                .map(|totals| {
                    CampaignRow::from_totals(key.source.clone(), key.campaign.clone(), totals)
                }),
            devices: devices.into_iter().map(Breakdown::from).collect(),
            geo: geo.into_iter().map(LocationRow::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_database::{MemoryStore, SessionStore};
    use beacon_entities::{
        ActionRecord, DeviceProfile, DeviceType, EventKind, GeoMethod, GeoProfile, SessionStart,
        Utm, VariantRef,
    };

    fn start(session_id: &str, ip: &str, source: Option<&str>, city: Option<&str>) -> SessionStart {
        SessionStart {
            session_id: session_id.into(),
            utm: Utm {
                source: source.map(str::to_string),
                campaign: source.map(|_| "spring".to_string()),
                ..Utm::default()
            },
            page_url: None,
            referrer: None,
            variant: VariantRef::default(),
            device: DeviceProfile {
                device_type: DeviceType::Mobile,
                ..DeviceProfile::default()
            },
            user_agent: "test".into(),
            ip: Some(ip.into()),
            geo: GeoProfile {
                city: city.map(str::to_string),
                country: city.map(|_| "Germany".to_string()),
                lat: city.map(|_| 52.52),
                lon: city.map(|_| 13.405),
                method: GeoMethod::Ip,
                ..GeoProfile::unresolved()
            },
        }
    }

    fn action(section: &str, event: EventKind, time_spent: Option<f64>) -> ActionRecord {
        ActionRecord {
            section: section.into(),
            event,
            time_spent,
            timestamp: Utc::now(),
        }
    }

    async fn seeded() -> AnalyticsService {
        let store = Arc::new(MemoryStore::new());
        store
            .start_session(start("s-google-1", "203.0.113.1", Some("google"), Some("Berlin")))
            .await
            .unwrap();
        store
            .start_session(start("s-google-2", "203.0.113.2", Some("google"), None))
            .await
            .unwrap();
        store
            .start_session(start("s-direct-1", "203.0.113.1", None, None))
            .await
            .unwrap();
        store
            .append_actions(
                "s-google-1",
                vec![
                    action("hero", EventKind::SectionTime, Some(6.0)),
                    action("services", EventKind::SectionTime, Some(3.0)),
                    action("hero", EventKind::CtaClick, None),
                ],
            )
            .await
            .unwrap();

        AnalyticsService::new(store, AnalyticsSettings::default())
    }

    #[tokio::test]
    async fn test_overview_totals_and_charts() {
        let service = seeded().await;

        let overview = service.overview().await.unwrap();

        assert!(overview.ok);
        assert_eq!(overview.totals.sessions, 3);
        assert_eq!(overview.totals.unique_users, 2);
        assert_eq!(overview.totals.active_users_30m, 2);
        assert_eq!(overview.totals.cta_clicks, 1);
        assert_eq!(
            overview.charts.avg_time_by_section,
            vec![
                SectionTime { section: "hero".into(), avg_seconds: 6.0 },
                SectionTime { section: "services".into(), avg_seconds: 3.0 },
            ]
        );
        assert_eq!(overview.charts.device_breakdown[0].label, "mobile");
        assert_eq!(overview.charts.source_breakdown[0].label, "google");
        assert_eq!(overview.charts.geo_top[0].location, "Unknown");
        assert_eq!(overview.charts.geo_top[0].count, 2);
    }

    #[tokio::test]
    async fn test_campaign_rows_and_sources() {
        let service = seeded().await;

        let campaigns = service.campaigns_overview().await.unwrap();

        let google = &campaigns.rows[0];
        assert_eq!((google.source.as_str(), google.campaign.as_str()), ("google", "spring"));
        assert_eq!(google.sessions, 2);
        assert_eq!(google.ctr, 0.5);
        assert_eq!(google.avg_hero, 3.0);
        assert_eq!(google.avg_time_per_session, 4.5);

        let direct = &campaigns.rows[1];
        assert_eq!((direct.source.as_str(), direct.campaign.as_str()), ("direct", "(none)"));
        assert_eq!(campaigns.by_source.len(), 2);
    }

    #[tokio::test]
    async fn test_campaign_detail_is_scoped() {
        let service = seeded().await;

        let detail = service
            .campaign_detail(&CampaignKey::new("google", "spring"))
            .await
            .unwrap();
        let head = detail.head.unwrap();
        assert_eq!(head.sessions, 2);
        assert_eq!(head.users, 2);
        assert_eq!(detail.devices[0].count, 2);
        assert_eq!(detail.geo.len(), 2);

        let empty = service
            .campaign_detail(&CampaignKey::new("bing", "(none)"))
            .await
            .unwrap();
        assert!(empty.head.is_none());
        assert!(empty.devices.is_empty());
    }

    #[tokio::test]
    async fn test_points_and_actions() {
        let service = seeded().await;

        let points = service.geo_points().await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].city.as_deref(), Some("Berlin"));

        let actions = service.recent_actions().await.unwrap();
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| a.session_id == "s-google-1"));
    }
}
