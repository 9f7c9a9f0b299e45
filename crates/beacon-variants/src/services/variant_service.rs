use std::collections::HashMap;
use std::sync::Arc;

use beacon_core::problem::{conflict, internal_server_error, invalid_id, not_found};
use beacon_core::ApiError;
use beacon_database::{AnalyticsStore, GroupTotals, Grouping, SessionStore, StoreError, VariantStore};
use beacon_entities::{NewVariant, VariantDocument, VariantPatch, VariantRef};
use bson::oid::ObjectId;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::types::VariantPerformance;

/// Re-samples allowed when a concurrent request exhausts the sampled variant
const MAX_CLAIM_ATTEMPTS: usize = 3;
const UNKNOWN_VARIANT_NAME: &str = "(unknown)";

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("Storage error: {0}")]
    Store(StoreError),
    #[error("Invalid variant id: {0}")]
    InvalidId(String),
    #[error("Variant {0} not found")]
    NotFound(String),
    #[error("A variant named {0} already exists")]
    DuplicateName(String),
}

impl From<StoreError> for VariantError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(name) => VariantError::DuplicateName(name),
            other => VariantError::Store(other),
        }
    }
}

impl From<VariantError> for ApiError {
    fn from(err: VariantError) -> Self {
        match err {
            VariantError::Store(e) => {
                error!("Variant storage failure: {}", e);
                internal_server_error()
            }
            VariantError::InvalidId(_) => invalid_id(),
            VariantError::NotFound(_) => not_found(),
            VariantError::DuplicateName(_) => conflict(),
        }
    }
}

/// Which rule selected a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentPath {
    Forced,
    Pinned,
    Random,
}

pub struct AssignRequest {
    pub session_id: String,
    pub force_id: Option<String>,
    pub force_name: Option<String>,
}

pub struct VariantService {
    variants: Arc<dyn VariantStore>,
    sessions: Arc<dyn SessionStore>,
    analytics: Arc<dyn AnalyticsStore>,
}

impl VariantService {
    pub fn new(
        variants: Arc<dyn VariantStore>,
        sessions: Arc<dyn SessionStore>,
        analytics: Arc<dyn AnalyticsStore>,
    ) -> Self {
        Self {
            variants,
            sessions,
            analytics,
        }
    }

    pub async fn list_variants(&self) -> Result<Vec<VariantDocument>, VariantError> {
        Ok(self.variants.list_variants().await?)
    }

    pub async fn create_variant(&self, variant: NewVariant) -> Result<VariantDocument, VariantError> {
        let created = self
            .variants
            .insert_variant(variant.into_document(Utc::now()))
            .await?;
        info!("Created variant {} ({})", created.name, created.id);
        Ok(created)
    }

    /// Apply a partial update. Pinning clears the flag on every other variant
    /// first, so at most one stays pinned.
    pub async fn update_variant(
        &self,
        id: &str,
        patch: VariantPatch,
    ) -> Result<VariantDocument, VariantError> {
        let oid = parse_id(id)?;

        if patch.pinned == Some(true) {
            if self.variants.find_variant(oid).await?.is_none() {
                return Err(VariantError::NotFound(id.to_string()));
            }
            let unpinned = self.variants.unpin_others(oid).await?;
            debug!("Unpinned {} variants before pinning {}", unpinned, id);
        }

        self.variants
            .update_variant(oid, &patch)
            .await?
            .ok_or_else(|| VariantError::NotFound(id.to_string()))
    }

    pub async fn delete_variant(&self, id: &str) -> Result<(), VariantError> {
        let oid = parse_id(id)?;
        if !self.variants.delete_variant(oid).await? {
            return Err(VariantError::NotFound(id.to_string()));
        }
        info!("Deleted variant {}", id);
        Ok(())
    }

    /// Pick a variant for a visit: forced, then pinned, then random under cap.
    /// The choice (or its absence) is always recorded on the session.
    pub async fn assign(
        &self,
        request: AssignRequest,
    ) -> Result<Option<VariantDocument>, VariantError> {
        let chosen = self.select(&request).await?;

        let reference = match &chosen {
            Some((variant, _)) => VariantRef {
                id: Some(variant.id.to_hex()),
                name: Some(variant.name.clone()),
            },
            None => VariantRef::default(),
        };
        self.sessions
            .link_variant(&request.session_id, reference)
            .await?;

        match &chosen {
            Some((variant, path)) => debug!(
                "Assigned variant {} to session {} via {:?}",
                variant.name, request.session_id, path
            ),
            None => debug!("No variant eligible for session {}", request.session_id),
        }

        Ok(chosen.map(|(variant, _)| variant))
    }

    async fn select(
        &self,
        request: &AssignRequest,
    ) -> Result<Option<(VariantDocument, AssignmentPath)>, VariantError> {
        if let Some(forced) = self.find_forced(request).await? {
            if let Some(variant) = self.variants.record_impression(forced).await? {
                return Ok(Some((variant, AssignmentPath::Forced)));
            }
        }

        if let Some(variant) = self.variants.claim_pinned().await? {
            return Ok(Some((variant, AssignmentPath::Pinned)));
        }

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let Some(candidate) = self.variants.sample_eligible().await? else {
                return Ok(None);
            };
            if let Some(variant) = self.variants.claim_under_cap(candidate).await? {
                return Ok(Some((variant, AssignmentPath::Random)));
            }
            debug!("Variant {} reached its cap concurrently, re-sampling", candidate);
        }

        warn!(
            "Gave up assigning a variant after {} contended attempts",
            MAX_CLAIM_ATTEMPTS
        );
        Ok(None)
    }

    /// `forceId` wins over `forceName`; a malformed id matches nothing
    async fn find_forced(&self, request: &AssignRequest) -> Result<Option<ObjectId>, VariantError> {
        if let Some(force_id) = request.force_id.as_deref() {
            let found = match ObjectId::parse_str(force_id) {
                Ok(oid) => self.variants.find_variant(oid).await?,
                Err(_) => {
                    debug!("Ignoring malformed forceId {}", force_id);
                    None
                }
            };
            return Ok(found.map(|variant| variant.id));
        }

        if let Some(force_name) = request.force_name.as_deref() {
            let found = self.variants.find_variant_by_name(force_name).await?;
            return Ok(found.map(|variant| variant.id));
        }

        Ok(None)
    }

    /// Per-variant performance joined with each variant's stored settings,
    /// sorted by sessions descending
    pub async fn performance(&self) -> Result<Vec<VariantPerformance>, VariantError> {
        let totals = self.analytics.group_totals(Grouping::Variant, None).await?;
        let variants: HashMap<String, VariantDocument> = self
            .variants
            .list_variants()
            .await?
            .into_iter()
            .map(|variant| (variant.id.to_hex(), variant))
            .collect();

        let mut rows: Vec<VariantPerformance> = totals
            .into_iter()
            .map(|row| {
                let stored = row.variant_id.as_ref().and_then(|id| variants.get(id));
                performance_row(row, stored)
            })
            .collect();
        rows.sort_by(|a, b| b.sessions.cmp(&a.sessions));
        Ok(rows)
    }
}

fn parse_id(id: &str) -> Result<ObjectId, VariantError> {
    ObjectId::parse_str(id).map_err(|_| VariantError::InvalidId(id.to_string()))
}

fn per_session(value: f64, sessions: i64) -> f64 {
    if sessions > 0 {
        value / sessions as f64
    } else {
        0.0
    }
}

/// Orphaned references keep their totals with zeroed settings
fn performance_row(row: GroupTotals, stored: Option<&VariantDocument>) -> VariantPerformance {
    let name = row
        .variant_name
        .clone()
        .or_else(|| stored.map(|variant| variant.name.clone()))
        .unwrap_or_else(|| UNKNOWN_VARIANT_NAME.to_string());

    VariantPerformance {
        variant_id: row.variant_id,
        variant_name: row.variant_name,
        name,
        sessions: row.sessions,
        users: row.users,
        clicks: row.cta_clicks,
        ctr: per_session(row.cta_clicks as f64, row.sessions),
        avg_hero: per_session(row.hero_time, row.sessions),
        avg_services: per_session(row.services_time, row.sessions),
        avg_contact: per_session(row.contact_time, row.sessions),
        impressions: stored.map_or(0, |variant| variant.impressions),
        show_cap: stored.map_or(0, |variant| variant.show_cap),
        active: stored.is_some_and(|variant| variant.active),
        pinned: stored.is_some_and(|variant| variant.pinned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::ErrorKind;
    use beacon_database::MemoryStore;
    use beacon_entities::{ActionRecord, EventKind};

    fn service() -> (VariantService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = VariantService::new(store.clone(), store.clone(), store.clone());
        (service, store)
    }

    fn new_variant(name: &str, show_cap: i64) -> NewVariant {
        NewVariant {
            name: name.into(),
            hero_title: format!("{name} title"),
            hero_sub: format!("{name} subtitle"),
            cta_text: None,
            cta_href: None,
            show_cap: Some(show_cap),
        }
    }

    fn assign(session_id: &str) -> AssignRequest {
        AssignRequest {
            session_id: session_id.into(),
            force_id: None,
            force_name: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let (service, _) = service();
        service.create_variant(new_variant("Spring", 10)).await.unwrap();

        let err = service
            .create_variant(new_variant("Spring", 5))
            .await
            .unwrap_err();

        assert_eq!(ApiError::from(err).kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_update_rejects_malformed_and_unknown_ids() {
        let (service, _) = service();

        let err = service
            .update_variant("not-an-id", VariantPatch::default())
            .await
            .unwrap_err();
        assert_eq!(ApiError::from(err).kind(), ErrorKind::InvalidId);

        let missing = ObjectId::new().to_hex();
        let err = service
            .update_variant(
                &missing,
                VariantPatch {
                    pinned: Some(true),
                    ..VariantPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(ApiError::from(err).kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_pinning_transfers() {
        let (service, _) = service();
        let first = service.create_variant(new_variant("First", 10)).await.unwrap();
        let second = service.create_variant(new_variant("Second", 10)).await.unwrap();
        let pin = VariantPatch {
            pinned: Some(true),
            ..VariantPatch::default()
        };

        service
            .update_variant(&first.id.to_hex(), pin.clone())
            .await
            .unwrap();
        service
            .update_variant(&second.id.to_hex(), pin)
            .await
            .unwrap();

        let pinned: Vec<String> = service
            .list_variants()
            .await
            .unwrap()
            .into_iter()
            .filter(|variant| variant.pinned)
            .map(|variant| variant.name)
            .collect();
        assert_eq!(pinned, vec!["Second".to_string()]);
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, _) = service();
        let variant = service.create_variant(new_variant("Gone", 10)).await.unwrap();
        let id = variant.id.to_hex();

        service.delete_variant(&id).await.unwrap();
        let err = service.delete_variant(&id).await.unwrap_err();
        assert!(matches!(err, VariantError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_random_assignment_links_session() {
        let (service, store) = service();
        let variant = service.create_variant(new_variant("Only", 10)).await.unwrap();

        let chosen = service.assign(assign("s-aaaaaaaa")).await.unwrap().unwrap();

        assert_eq!(chosen.id, variant.id);
        assert_eq!(chosen.impressions, 1);
        let session = store.find_session("s-aaaaaaaa").await.unwrap().unwrap();
        assert_eq!(session.variant_id, Some(variant.id.to_hex()));
        assert_eq!(session.variant_name.as_deref(), Some("Only"));
    }

    #[tokio::test]
    async fn test_random_assignment_respects_cap() {
        let (service, store) = service();
        service.create_variant(new_variant("Tiny", 2)).await.unwrap();

        for n in 0..4 {
            service.assign(assign(&format!("session-{n:04}"))).await.unwrap();
        }

        let variants = store.list_variants().await.unwrap();
        assert_eq!(variants[0].impressions, 2);

        // Exhausted variants leave later sessions without one
        let session = store.find_session("session-0003").await.unwrap().unwrap();
        assert_eq!(session.variant_id, None);
    }

    #[tokio::test]
    async fn test_forced_ignores_cap_and_active() {
        let (service, _) = service();
        let variant = service.create_variant(new_variant("Preview", 0)).await.unwrap();
        service
            .update_variant(
                &variant.id.to_hex(),
                VariantPatch {
                    active: Some(false),
                    ..VariantPatch::default()
                },
            )
            .await
            .unwrap();

        let chosen = service
            .assign(AssignRequest {
                session_id: "s-forced01".into(),
                force_id: Some(variant.id.to_hex()),
                force_name: Some("Someone else".into()),
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(chosen.id, variant.id);
        assert_eq!(chosen.impressions, 1);
    }

    #[tokio::test]
    async fn test_malformed_force_id_falls_through_to_pinned() {
        let (service, _) = service();
        service.create_variant(new_variant("Named", 10)).await.unwrap();
        let pinned = service.create_variant(new_variant("Pinned", 10)).await.unwrap();
        service
            .update_variant(
                &pinned.id.to_hex(),
                VariantPatch {
                    pinned: Some(true),
                    ..VariantPatch::default()
                },
            )
            .await
            .unwrap();

        let chosen = service
            .assign(AssignRequest {
                session_id: "s-fallthru".into(),
                force_id: Some("zzz".into()),
                force_name: Some("Named".into()),
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(chosen.name, "Pinned");
    }

    #[tokio::test]
    async fn test_force_by_name() {
        let (service, _) = service();
        service.create_variant(new_variant("Named", 0)).await.unwrap();

        let chosen = service
            .assign(AssignRequest {
                session_id: "s-byname01".into(),
                force_id: None,
                force_name: Some("Named".into()),
            })
            .await
            .unwrap();

        assert_eq!(chosen.map(|v| v.name).as_deref(), Some("Named"));
    }

    #[tokio::test]
    async fn test_nothing_eligible_clears_session_reference() {
        let (service, store) = service();
        store
            .link_variant(
                "s-cleared1",
                VariantRef {
                    id: Some("old".into()),
                    name: Some("Old".into()),
                },
            )
            .await
            .unwrap();

        let chosen = service.assign(assign("s-cleared1")).await.unwrap();

        assert!(chosen.is_none());
        let session = store.find_session("s-cleared1").await.unwrap().unwrap();
        assert_eq!(session.variant_id, None);
        assert_eq!(session.variant_name, None);
    }

    #[tokio::test]
    async fn test_performance_joins_stored_settings() {
        let (service, store) = service();
        let variant = service.create_variant(new_variant("Spring", 10)).await.unwrap();

        service.assign(assign("s-perf-001")).await.unwrap();
        service.assign(assign("s-perf-002")).await.unwrap();
        store
            .append_actions(
                "s-perf-001",
                vec![
                    ActionRecord {
                        section: "hero".into(),
                        event: EventKind::SectionTime,
                        time_spent: Some(8.0),
                        timestamp: Utc::now(),
                    },
                    ActionRecord {
                        section: "hero".into(),
                        event: EventKind::CtaClick,
                        time_spent: None,
                        timestamp: Utc::now(),
                    },
                ],
            )
            .await
            .unwrap();
        store
            .link_variant(
                "s-orphan01",
                VariantRef {
                    id: Some(ObjectId::new().to_hex()),
                    name: None,
                },
            )
            .await
            .unwrap();

        let rows = service.performance().await.unwrap();

        assert_eq!(rows.len(), 2);
        let spring = &rows[0];
        assert_eq!(spring.variant_id, Some(variant.id.to_hex()));
        assert_eq!(spring.name, "Spring");
        assert_eq!(spring.sessions, 2);
        assert_eq!(spring.clicks, 1);
        assert_eq!(spring.ctr, 0.5);
        assert_eq!(spring.avg_hero, 4.0);
        assert_eq!(spring.impressions, 2);
        assert_eq!(spring.show_cap, 10);
        assert!(spring.active);

        let orphan = &rows[1];
        assert_eq!(orphan.name, UNKNOWN_VARIANT_NAME);
        assert_eq!(orphan.show_cap, 0);
        assert!(!orphan.active);
    }
}
