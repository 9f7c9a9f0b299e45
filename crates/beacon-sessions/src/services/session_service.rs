use std::sync::Arc;

use beacon_core::problem::{
    internal_server_error, payload_too_large, session_not_found, validation_error,
};
use beacon_core::{ApiError, ClientInfo};
use beacon_database::{SessionStore, StoreError};
use beacon_entities::{ActionRecord, GeoProfile, SessionDocument, SessionStart, Utm};
use beacon_geo::{is_unroutable, resolve_device, Coordinates, GeoLookupService};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::types::{ActionInput, StartSessionRequest, MAX_ACTIONS_PER_BATCH};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Session {0} not found")]
    NotFound(String),
    #[error("Batch of {0} actions exceeds the limit")]
    TooManyActions(usize),
    #[error("Missing sessionId")]
    MissingSessionId,
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Store(e) => {
                error!("Session storage failure: {}", e);
                internal_server_error()
            }
            SessionError::NotFound(_) => session_not_found(),
            SessionError::TooManyActions(_) => payload_too_large(),
            SessionError::MissingSessionId => validation_error().issue("sessionId", "Required"),
        }
    }
}

/// Session ingestion: start, action batches and late geo refinement
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    geo: Arc<GeoLookupService>,
}

impl SessionService {
    pub fn new(sessions: Arc<dyn SessionStore>, geo: Arc<GeoLookupService>) -> Self {
        Self { sessions, geo }
    }

    /// Enrich and upsert a session. Repeating a start overwrites the mutable
    /// fields and keeps the stored creation time and actions.
    pub async fn start_session(
        &self,
        request: StartSessionRequest,
        client: &ClientInfo,
    ) -> Result<SessionDocument, SessionError> {
        let session_id = request
            .session_id
            .clone()
            .ok_or(SessionError::MissingSessionId)?;

        let device = resolve_device(&client.user_agent);

        let routable_ip = client
            .ip_address
            .as_deref()
            .filter(|ip| !is_unroutable(ip));
        let coords = match (request.lat, request.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        };
        let geo = self.geo.resolve_location(routable_ip, coords).await;

        let start = SessionStart {
            session_id,
            variant: request.variant_ref(),
            utm: request.utm.map(Utm::from).unwrap_or_default(),
            page_url: request.page_url,
            referrer: request.referrer,
            device,
            user_agent: client.user_agent.clone(),
            ip: client.ip_address.clone(),
            geo,
        };

        let session = self.sessions.start_session(start).await?;
        info!(
            "Session {} started from {}",
            session.session_id,
            session.location.as_deref().unwrap_or("Unknown")
        );
        Ok(session)
    }

    /// Append a batch in submission order. Returns how many were stored.
    pub async fn append_actions(
        &self,
        session_id: &str,
        actions: Vec<ActionInput>,
    ) -> Result<usize, SessionError> {
        if actions.len() > MAX_ACTIONS_PER_BATCH {
            return Err(SessionError::TooManyActions(actions.len()));
        }

        let received_at = Utc::now();
        let records: Vec<ActionRecord> = actions
            .into_iter()
            .map(|action| normalize_action(action, received_at))
            .collect();
        let appended = records.len();

        if !self.sessions.append_actions(session_id, records).await? {
            return Err(SessionError::NotFound(session_id.to_string()));
        }

        debug!("Appended {} actions to session {}", appended, session_id);
        Ok(appended)
    }

    /// Refine geography from device coordinates. `None` when the session does
    /// not exist; nothing is created in that case.
    pub async fn update_geo(
        &self,
        session_id: &str,
        coords: Coordinates,
    ) -> Result<Option<SessionDocument>, SessionError> {
        let geo: GeoProfile = self.geo.resolve_coordinates(coords).await;
        let updated = self.sessions.update_geo(session_id, geo).await?;
        if updated.is_none() {
            debug!("Geo update for unknown session {}", session_id);
        }
        Ok(updated)
    }
}

/// Missing timestamps take the arrival time
fn normalize_action(action: ActionInput, received_at: DateTime<Utc>) -> ActionRecord {
    let timestamp = action
        .timestamp
        .as_deref()
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or(received_at);

    ActionRecord {
        section: action.section,
        event: action.event,
        time_spent: action.time_spent,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::ErrorKind;
    use beacon_database::MemoryStore;
    use beacon_entities::{DeviceType, EventKind, GeoMethod};
    use beacon_geo::MockGeoLookup;
    use chrono::TimeZone;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    fn service() -> (SessionService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(
            store.clone(),
            Arc::new(GeoLookupService::Mock(MockGeoLookup)),
        );
        (service, store)
    }

    fn request(session_id: &str) -> StartSessionRequest {
        StartSessionRequest {
            session_id: Some(session_id.to_string()),
            utm: None,
            page_url: None,
            referrer: None,
            variant: None,
            variant_id: None,
            variant_name: None,
            lat: None,
            lon: None,
        }
    }

    fn client(ip: &str) -> ClientInfo {
        ClientInfo {
            ip_address: Some(ip.to_string()),
            user_agent: IPHONE_UA.to_string(),
        }
    }

    fn action(event: EventKind, timestamp: Option<&str>) -> ActionInput {
        ActionInput {
            section: "hero".into(),
            event,
            time_spent: Some(2.5),
            timestamp: timestamp.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_start_enriches_device_and_location() {
        let (service, _) = service();

        let session = service
            .start_session(request("session-001"), &client("203.0.113.9"))
            .await
            .unwrap();

        assert_eq!(session.device, Some(DeviceType::Mobile));
        assert_eq!(session.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(session.geo_method, Some(GeoMethod::Ip));
        assert!(session.location.is_some());
    }

    #[tokio::test]
    async fn test_start_with_coordinates_uses_gps() {
        let (service, _) = service();
        let mut req = request("session-002");
        req.lat = Some(52.52);
        req.lon = Some(13.405);

        let session = service
            .start_session(req, &client("10.0.0.4"))
            .await
            .unwrap();

        assert_eq!(session.geo_method, Some(GeoMethod::Gps));
        // Private addresses are still stored, just never looked up
        assert_eq!(session.ip.as_deref(), Some("10.0.0.4"));
    }

    #[tokio::test]
    async fn test_repeated_start_keeps_actions() {
        let (service, store) = service();
        service
            .start_session(request("session-003"), &client("203.0.113.9"))
            .await
            .unwrap();
        service
            .append_actions("session-003", vec![action(EventKind::CtaClick, None)])
            .await
            .unwrap();

        let mut again = request("session-003");
        again.variant_name = Some("Spring".into());
        service
            .start_session(again, &client("203.0.113.9"))
            .await
            .unwrap();

        let stored = store.find_session("session-003").await.unwrap().unwrap();
        assert_eq!(stored.actions.len(), 1);
        assert_eq!(stored.variant_name.as_deref(), Some("Spring"));
    }

    #[tokio::test]
    async fn test_append_to_unknown_session() {
        let (service, _) = service();

        let err = service
            .append_actions("missing-session", vec![action(EventKind::Scrolled, None)])
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::NotFound(_)));
        assert_eq!(ApiError::from(err).kind(), ErrorKind::SessionNotFound);
    }

    #[tokio::test]
    async fn test_append_rejects_oversized_batch() {
        let (service, _) = service();
        let batch = (0..21).map(|_| action(EventKind::Scrolled, None)).collect();

        let err = service.append_actions("any-session", batch).await.unwrap_err();

        assert_eq!(ApiError::from(err).kind(), ErrorKind::PayloadTooLarge);
    }

    #[tokio::test]
    async fn test_append_keeps_order_and_timestamps() {
        let (service, store) = service();
        service
            .start_session(request("session-004"), &client("203.0.113.9"))
            .await
            .unwrap();

        let appended = service
            .append_actions(
                "session-004",
                vec![
                    action(EventKind::SectionEnter, Some("2024-03-01T10:00:00Z")),
                    action(EventKind::SectionTime, None),
                ],
            )
            .await
            .unwrap();
        assert_eq!(appended, 2);

        let stored = store.find_session("session-004").await.unwrap().unwrap();
        assert_eq!(stored.actions[0].event, EventKind::SectionEnter);
        assert_eq!(
            stored.actions[0].timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(stored.actions[1].event, EventKind::SectionTime);
    }

    #[tokio::test]
    async fn test_geo_update_does_not_create_sessions() {
        let (service, store) = service();

        let updated = service
            .update_geo("missing-session", Coordinates { lat: 1.0, lon: 2.0 })
            .await
            .unwrap();

        assert!(updated.is_none());
        assert!(store.find_session("missing-session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_geo_update_sets_gps_method() {
        let (service, _) = service();
        service
            .start_session(request("session-005"), &client("203.0.113.9"))
            .await
            .unwrap();

        let updated = service
            .update_geo("session-005", Coordinates { lat: 48.85, lon: 2.35 })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.geo_method, Some(GeoMethod::Gps));
    }
}
