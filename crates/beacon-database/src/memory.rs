//! In-process store used by tests and local runs without MongoDB.
//!
//! Mirrors the aggregation semantics of the MongoDB pipelines and notifies
//! subscribers after every write.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use beacon_core::UtcDateTime;
use beacon_entities::{
    ActionRecord, EventKind, GeoProfile, SessionDocument, SessionStart, VariantDocument,
    VariantPatch, VariantRef,
};
use bson::oid::ObjectId;
use chrono::Utc;
use futures::stream::BoxStream;
use rand::seq::SliceRandom;
use tokio::sync::{broadcast, RwLock};

use crate::queries::{
    CampaignKey, GeoPoint, GroupTotals, Grouping, LabelCount, LocationStats, OverviewTotals,
    RecentAction, SectionAverage, DIRECT_SOURCE, UNKNOWN_DEVICE, UNKNOWN_LOCATION,
};
use crate::store::{AnalyticsStore, ChangeFeed, SessionStore, StoreResult, VariantStore};
use crate::StoreError;

#[derive(Default)]
struct State {
    sessions: HashMap<String, SessionDocument>,
    variants: Vec<VariantDocument>,
}

pub struct MemoryStore {
    state: RwLock<State>,
    changes: broadcast::Sender<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(State::default()),
            changes,
        }
    }

    fn notify(&self) {
        // no subscribers is fine
        let _ = self.changes.send(());
    }

    /// Store a session as-is, bypassing the start-session merge rules
    pub async fn insert_session(&self, session: SessionDocument) {
        self.state
            .write()
            .await
            .sessions
            .insert(session.session_id.clone(), session);
        self.notify();
    }

    async fn scoped_sessions(&self, scope: Option<&CampaignKey>) -> Vec<SessionDocument> {
        self.state
            .read()
            .await
            .sessions
            .values()
            .filter(|session| scope.map_or(true, |key| key.matches(session)))
            .cloned()
            .collect()
    }
}

fn distinct_ips<'a>(sessions: impl IntoIterator<Item = &'a SessionDocument>) -> i64 {
    sessions
        .into_iter()
        .filter_map(|session| session.ip.as_deref())
        .filter(|ip| !ip.is_empty())
        .collect::<HashSet<_>>()
        .len() as i64
}

fn section_time(session: &SessionDocument, section: Option<&str>) -> f64 {
    session
        .actions
        .iter()
        .filter(|action| action.event == EventKind::SectionTime)
        .filter(|action| section.map_or(true, |s| action.section == s))
        .map(|action| action.time_spent.unwrap_or(0.0))
        .sum()
}

fn cta_clicks(session: &SessionDocument) -> i64 {
    session
        .actions
        .iter()
        .filter(|action| action.event == EventKind::CtaClick)
        .count() as i64
}

fn label_counts(labels: impl IntoIterator<Item = String>) -> Vec<LabelCount> {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_default() += 1;
    }

    let mut rows: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    rows
}

fn group_key(grouping: Grouping, session: &SessionDocument) -> (Option<String>, Option<String>) {
    let key = CampaignKey::of(session);
    match grouping {
        Grouping::SourceCampaign => (Some(key.source), Some(key.campaign)),
        Grouping::Source => (Some(key.source), None),
        Grouping::Variant => (session.variant_id.clone(), None),
        Grouping::Overall => (None, None),
    }
}

fn totals_for(grouping: Grouping, members: &[&SessionDocument]) -> GroupTotals {
    let first = members.first().copied();
    let (key, second) = first
        .map(|session| group_key(grouping, session))
        .unwrap_or((None, None));

    let (source, campaign, variant_id) = match grouping {
        Grouping::SourceCampaign => (key, second, None),
        Grouping::Source => (key, None, None),
        Grouping::Variant => (None, None, key),
        Grouping::Overall => (None, None, None),
    };

    GroupTotals {
        source,
        campaign,
        variant_id,
        variant_name: first.and_then(|session| session.variant_name.clone()),
        sessions: members.len() as i64,
        users: distinct_ips(members.iter().copied()),
        cta_clicks: members.iter().map(|session| cta_clicks(session)).sum(),
        total_time: members.iter().map(|s| section_time(s, None)).sum(),
        hero_time: members.iter().map(|s| section_time(s, Some("hero"))).sum(),
        services_time: members.iter().map(|s| section_time(s, Some("services"))).sum(),
        contact_time: members.iter().map(|s| section_time(s, Some("contact"))).sum(),
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn start_session(&self, start: SessionStart) -> StoreResult<SessionDocument> {
        let now = Utc::now();
        let stored = {
            let mut state = self.state.write().await;
            let session = state
                .sessions
                .entry(start.session_id.clone())
                .or_insert_with(|| SessionDocument::new(start.session_id.clone(), now));
            session.apply_start(&start, now);
            session.clone()
        };
        self.notify();
        Ok(stored)
    }

    async fn append_actions(
        &self,
        session_id: &str,
        actions: Vec<ActionRecord>,
    ) -> StoreResult<bool> {
        let found = {
            let mut state = self.state.write().await;
            match state.sessions.get_mut(session_id) {
                Some(session) => {
                    session.actions.extend(actions);
                    session.updated_at = Utc::now();
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify();
        }
        Ok(found)
    }

    async fn update_geo(
        &self,
        session_id: &str,
        geo: GeoProfile,
    ) -> StoreResult<Option<SessionDocument>> {
        let updated = {
            let mut state = self.state.write().await;
            state.sessions.get_mut(session_id).map(|session| {
                session.apply_geo(&geo, Utc::now());
                session.clone()
            })
        };
        if updated.is_some() {
            self.notify();
        }
        Ok(updated)
    }

    async fn link_variant(&self, session_id: &str, variant: VariantRef) -> StoreResult<()> {
        let now = Utc::now();
        {
            let mut state = self.state.write().await;
            state
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| SessionDocument::new(session_id, now))
                .apply_variant(&variant, now);
        }
        self.notify();
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionDocument>> {
        Ok(self.state.read().await.sessions.get(session_id).cloned())
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn overview_totals(&self, active_since: UtcDateTime) -> StoreResult<OverviewTotals> {
        let state = self.state.read().await;
        let sessions = state.sessions.values();

        Ok(OverviewTotals {
            sessions: state.sessions.len() as i64,
            unique_users: distinct_ips(sessions.clone()),
            active_users: distinct_ips(sessions.clone().filter(|s| s.updated_at >= active_since)),
            cta_clicks: sessions.map(cta_clicks).sum(),
        })
    }

    async fn average_time_by_section(&self) -> StoreResult<Vec<SectionAverage>> {
        let state = self.state.read().await;
        let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();
        for action in state
            .sessions
            .values()
            .flat_map(|session| session.actions.iter())
            .filter(|action| action.event == EventKind::SectionTime)
        {
            let entry = totals.entry(action.section.clone()).or_default();
            entry.0 += action.time_spent.unwrap_or(0.0);
            entry.1 += 1;
        }

        Ok(totals
            .into_iter()
            .map(|(section, (total, n))| SectionAverage {
                section,
                avg_seconds: total / f64::from(n),
            })
            .collect())
    }

    async fn device_breakdown(&self, scope: Option<&CampaignKey>) -> StoreResult<Vec<LabelCount>> {
        let sessions = self.scoped_sessions(scope).await;
        Ok(label_counts(sessions.iter().map(|session| {
            session
                .device
                .map(|device| device.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string())
        })))
    }

    async fn source_breakdown(&self) -> StoreResult<Vec<LabelCount>> {
        let sessions = self.scoped_sessions(None).await;
        Ok(label_counts(sessions.iter().map(|session| {
            session
                .utm_source
                .clone()
                .unwrap_or_else(|| DIRECT_SOURCE.to_string())
        })))
    }

    async fn location_stats(
        &self,
        scope: Option<&CampaignKey>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<LocationStats>> {
        let sessions = self.scoped_sessions(scope).await;
        let mut groups: BTreeMap<String, Vec<&SessionDocument>> = BTreeMap::new();
        for session in &sessions {
            let location = session
                .location
                .clone()
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
            groups.entry(location).or_default().push(session);
        }

        let mut rows: Vec<LocationStats> = groups
            .into_iter()
            .map(|(location, members)| LocationStats {
                location,
                sessions: members.len() as i64,
                unique_users: distinct_ips(members),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.sessions
                .cmp(&a.sessions)
                .then_with(|| a.location.cmp(&b.location))
        });
        if let Some(limit) = limit {
            rows.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(rows)
    }

    async fn geo_points(&self) -> StoreResult<Vec<GeoPoint>> {
        let sessions = self.scoped_sessions(None).await;
        let mut groups: Vec<(GeoPoint, Vec<&SessionDocument>)> = Vec::new();
        for session in &sessions {
            let (Some(lat), Some(lon)) = (session.lat, session.lon) else {
                continue;
            };
            let existing = groups.iter_mut().find(|(point, _)| {
                point.country == session.country
                    && point.city == session.city
                    && point.lat == lat
                    && point.lon == lon
            });
            match existing {
                Some((_, members)) => members.push(session),
                None => groups.push((
                    GeoPoint {
                        country: session.country.clone(),
                        city: session.city.clone(),
                        lat,
                        lon,
                        sessions: 0,
                        users: 0,
                    },
                    vec![session],
                )),
            }
        }

        let mut points: Vec<GeoPoint> = groups
            .into_iter()
            .map(|(mut point, members)| {
                point.sessions = members.len() as i64;
                point.users = distinct_ips(members);
                point
            })
            .collect();
        points.sort_by(|a, b| b.sessions.cmp(&a.sessions));
        Ok(points)
    }

    async fn recent_actions(&self, limit: i64) -> StoreResult<Vec<RecentAction>> {
        let state = self.state.read().await;
        let mut actions: Vec<RecentAction> = state
            .sessions
            .values()
            .flat_map(|session| {
                session.actions.iter().map(|action| RecentAction {
                    session_id: session.session_id.clone(),
                    section: action.section.clone(),
                    event: action.event,
                    time_spent: action.time_spent,
                    timestamp: action.timestamp,
                })
            })
            .collect();
        actions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        actions.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(actions)
    }

    async fn group_totals(
        &self,
        grouping: Grouping,
        scope: Option<&CampaignKey>,
    ) -> StoreResult<Vec<GroupTotals>> {
        let sessions = self.scoped_sessions(scope).await;
        let mut groups: Vec<((Option<String>, Option<String>), Vec<&SessionDocument>)> =
            Vec::new();
        for session in &sessions {
            let key = group_key(grouping, session);
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, members)) => members.push(session),
                None => groups.push((key, vec![session])),
            }
        }

        let mut rows: Vec<GroupTotals> = groups
            .iter()
            .map(|(_, members)| totals_for(grouping, members))
            .collect();
        rows.sort_by(|a, b| {
            b.sessions
                .cmp(&a.sessions)
                .then_with(|| b.cta_clicks.cmp(&a.cta_clicks))
        });
        Ok(rows)
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn list_variants(&self) -> StoreResult<Vec<VariantDocument>> {
        let mut variants = self.state.read().await.variants.clone();
        variants.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.active.cmp(&a.active))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(variants)
    }

    async fn insert_variant(&self, variant: VariantDocument) -> StoreResult<VariantDocument> {
        {
            let mut state = self.state.write().await;
            if state.variants.iter().any(|v| v.name == variant.name) {
                return Err(StoreError::Duplicate(format!(
                    "variant name {} already exists",
                    variant.name
                )));
            }
            state.variants.push(variant.clone());
        }
        self.notify();
        Ok(variant)
    }

    async fn find_variant(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>> {
        Ok(self
            .state
            .read()
            .await
            .variants
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn find_variant_by_name(&self, name: &str) -> StoreResult<Option<VariantDocument>> {
        Ok(self
            .state
            .read()
            .await
            .variants
            .iter()
            .find(|v| v.name == name)
            .cloned())
    }

    async fn update_variant(
        &self,
        id: ObjectId,
        patch: &VariantPatch,
    ) -> StoreResult<Option<VariantDocument>> {
        let updated = {
            let mut state = self.state.write().await;
            if let Some(name) = &patch.name {
                if state.variants.iter().any(|v| v.id != id && &v.name == name) {
                    return Err(StoreError::Duplicate(format!(
                        "variant name {} already exists",
                        name
                    )));
                }
            }
            state
                .variants
                .iter_mut()
                .find(|v| v.id == id)
                .map(|variant| {
                    patch.apply(variant, Utc::now());
                    variant.clone()
                })
        };
        if updated.is_some() {
            self.notify();
        }
        Ok(updated)
    }

    async fn unpin_others(&self, keep: ObjectId) -> StoreResult<u64> {
        let now = Utc::now();
        let mut unpinned = 0;
        {
            let mut state = self.state.write().await;
            for variant in state
                .variants
                .iter_mut()
                .filter(|v| v.id != keep && v.pinned)
            {
                variant.pinned = false;
                variant.updated_at = now;
                unpinned += 1;
            }
        }
        if unpinned > 0 {
            self.notify();
        }
        Ok(unpinned)
    }

    async fn delete_variant(&self, id: ObjectId) -> StoreResult<bool> {
        let removed = {
            let mut state = self.state.write().await;
            let before = state.variants.len();
            state.variants.retain(|v| v.id != id);
            state.variants.len() != before
        };
        if removed {
            self.notify();
        }
        Ok(removed)
    }

    async fn record_impression(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>> {
        let updated = {
            let mut state = self.state.write().await;
            state.variants.iter_mut().find(|v| v.id == id).map(|variant| {
                variant.impressions += 1;
                variant.clone()
            })
        };
        Ok(updated)
    }

    async fn claim_pinned(&self) -> StoreResult<Option<VariantDocument>> {
        let updated = {
            let mut state = self.state.write().await;
            state
                .variants
                .iter_mut()
                .find(|v| v.pinned && v.active)
                .map(|variant| {
                    variant.impressions += 1;
                    variant.clone()
                })
        };
        Ok(updated)
    }

    async fn sample_eligible(&self) -> StoreResult<Option<ObjectId>> {
        let state = self.state.read().await;
        let eligible: Vec<ObjectId> = state
            .variants
            .iter()
            .filter(|v| v.has_capacity())
            .map(|v| v.id)
            .collect();
        Ok(eligible.choose(&mut rand::thread_rng()).copied())
    }

    async fn claim_under_cap(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>> {
        let updated = {
            let mut state = self.state.write().await;
            state
                .variants
                .iter_mut()
                .find(|v| v.id == id && v.has_capacity())
                .map(|variant| {
                    variant.impressions += 1;
                    variant.clone()
                })
        };
        Ok(updated)
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self) -> BoxStream<'static, ()> {
        let mut receiver = self.changes.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield ();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_entities::{DeviceProfile, DeviceType, GeoMethod, NewVariant, Utm};
    use chrono::Duration;
    use futures::StreamExt;

    fn start(session_id: &str, source: Option<&str>, ip: Option<&str>) -> SessionStart {
        SessionStart {
            session_id: session_id.into(),
            utm: Utm {
                source: source.map(Into::into),
                campaign: source.map(|_| "spring".to_string()),
                ..Utm::default()
            },
            page_url: None,
            referrer: None,
            variant: VariantRef::default(),
            device: DeviceProfile::default(),
            user_agent: "test".into(),
            ip: ip.map(Into::into),
            geo: GeoProfile {
                city: Some("Berlin".into()),
                country: Some("Germany".into()),
                lat: Some(52.5),
                lon: Some(13.4),
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

    fn variant(name: &str, show_cap: i64) -> VariantDocument {
        NewVariant {
            name: name.into(),
            hero_title: "Title".into(),
            hero_sub: "Sub".into(),
            cta_text: None,
            cta_href: None,
            show_cap: Some(show_cap),
        }
        .into_document(Utc::now())
    }

    #[tokio::test]
    async fn test_start_is_idempotent_per_session() {
        let store = MemoryStore::new();
        let first = store.start_session(start("s-1", None, Some("1.1.1.1"))).await.unwrap();
        store
            .append_actions("s-1", vec![action("hero", EventKind::CtaClick, None)])
            .await
            .unwrap();
        let second = store.start_session(start("s-1", Some("google"), None)).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.actions.len(), 1);
        assert_eq!(second.utm_source.as_deref(), Some("google"));
        assert_eq!(second.ip, None);
    }

    #[tokio::test]
    async fn test_append_to_missing_session_reports_not_found() {
        let store = MemoryStore::new();
        let found = store
            .append_actions("missing", vec![action("hero", EventKind::Scrolled, None)])
            .await
            .unwrap();
        assert!(!found);
        assert!(store.find_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_variant_creates_bare_session() {
        let store = MemoryStore::new();
        let reference = VariantRef {
            id: Some("65f0c0ffee0000000000000a".into()),
            name: Some("Bold".into()),
        };
        store.link_variant("s-new", reference).await.unwrap();

        let session = store.find_session("s-new").await.unwrap().unwrap();
        assert_eq!(session.variant_name.as_deref(), Some("Bold"));
        assert!(session.actions.is_empty());
        assert!(session.device.is_none());
    }

    #[tokio::test]
    async fn test_overview_totals_ignore_empty_ips() {
        let store = MemoryStore::new();
        store.start_session(start("s-1", None, Some("1.1.1.1"))).await.unwrap();
        store.start_session(start("s-2", None, Some("1.1.1.1"))).await.unwrap();
        store.start_session(start("s-3", None, Some(""))).await.unwrap();
        store.start_session(start("s-4", None, None)).await.unwrap();
        store
            .append_actions(
                "s-1",
                vec![
                    action("hero", EventKind::CtaClick, None),
                    action("contact", EventKind::CtaClick, None),
                ],
            )
            .await
            .unwrap();

        let totals = store
            .overview_totals(Utc::now() - Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(totals.sessions, 4);
        assert_eq!(totals.unique_users, 1);
        assert_eq!(totals.active_users, 1);
        assert_eq!(totals.cta_clicks, 2);

        let later = store
            .overview_totals(Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(later.active_users, 0);
    }

    #[tokio::test]
    async fn test_section_averages_sorted_by_section() {
        let store = MemoryStore::new();
        store.start_session(start("s-1", None, None)).await.unwrap();
        store
            .append_actions(
                "s-1",
                vec![
                    action("services", EventKind::SectionTime, Some(4.0)),
                    action("hero", EventKind::SectionTime, Some(2.0)),
                    action("hero", EventKind::SectionTime, None),
                    action("hero", EventKind::SectionEnter, None),
                ],
            )
            .await
            .unwrap();

        let averages = store.average_time_by_section().await.unwrap();

        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].section, "hero");
        assert_eq!(averages[0].avg_seconds, 1.0);
        assert_eq!(averages[1].section, "services");
        assert_eq!(averages[1].avg_seconds, 4.0);
    }

    #[tokio::test]
    async fn test_breakdowns_default_missing_labels() {
        let store = MemoryStore::new();
        store.start_session(start("s-1", None, None)).await.unwrap();
        store.start_session(start("s-2", Some("google"), None)).await.unwrap();
        store.start_session(start("s-3", Some("google"), None)).await.unwrap();
        store
            .insert_session(SessionDocument::new("s-bare", Utc::now()))
            .await;

        let sources = store.source_breakdown().await.unwrap();
        // equal counts fall back to label order
        assert_eq!(sources[0], LabelCount { label: "direct".into(), count: 2 });
        assert_eq!(sources[1], LabelCount { label: "google".into(), count: 2 });

        let devices = store.device_breakdown(None).await.unwrap();
        assert_eq!(devices[0].label, DeviceType::Desktop.as_str());
        assert_eq!(devices[0].count, 3);
        assert_eq!(devices[1].label, "unknown");

        let scoped = store
            .device_breakdown(Some(&CampaignKey::new("google", "spring")))
            .await
            .unwrap();
        assert_eq!(scoped, vec![LabelCount { label: "desktop".into(), count: 2 }]);
    }

    #[tokio::test]
    async fn test_location_stats_and_geo_points() {
        let store = MemoryStore::new();
        store.start_session(start("s-1", None, Some("1.1.1.1"))).await.unwrap();
        store.start_session(start("s-2", None, Some("2.2.2.2"))).await.unwrap();
        store
            .insert_session(SessionDocument::new("s-bare", Utc::now()))
            .await;

        let locations = store.location_stats(None, Some(10)).await.unwrap();
        assert_eq!(locations[0].location, "Berlin, Germany");
        assert_eq!(locations[0].sessions, 2);
        assert_eq!(locations[0].unique_users, 2);
        assert_eq!(locations[1].location, "Unknown");

        let limited = store.location_stats(None, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);

        let points = store.geo_points().await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].sessions, 2);
        assert_eq!(points[0].users, 2);
        assert_eq!(points[0].city.as_deref(), Some("Berlin"));
    }

    #[tokio::test]
    async fn test_group_totals_by_campaign() {
        let store = MemoryStore::new();
        store.start_session(start("s-1", Some("google"), Some("1.1.1.1"))).await.unwrap();
        store.start_session(start("s-2", Some("google"), Some("2.2.2.2"))).await.unwrap();
        store.start_session(start("s-3", None, None)).await.unwrap();
        store
            .append_actions(
                "s-1",
                vec![
                    action("hero", EventKind::SectionTime, Some(3.0)),
                    action("contact", EventKind::SectionTime, Some(5.0)),
                    action("hero", EventKind::CtaClick, None),
                ],
            )
            .await
            .unwrap();

        let rows = store
            .group_totals(Grouping::SourceCampaign, None)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let google = &rows[0];
        assert_eq!(google.source.as_deref(), Some("google"));
        assert_eq!(google.campaign.as_deref(), Some("spring"));
        assert_eq!(google.sessions, 2);
        assert_eq!(google.users, 2);
        assert_eq!(google.cta_clicks, 1);
        assert_eq!(google.total_time, 8.0);
        assert_eq!(google.hero_time, 3.0);
        assert_eq!(google.contact_time, 5.0);
        assert_eq!(google.services_time, 0.0);

        assert_eq!(rows[1].source.as_deref(), Some("direct"));
        assert_eq!(rows[1].campaign.as_deref(), Some("(none)"));

        let scoped = store
            .group_totals(Grouping::Overall, Some(&CampaignKey::new("direct", "(none)")))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].sessions, 1);
    }

    #[tokio::test]
    async fn test_recent_actions_newest_first() {
        let store = MemoryStore::new();
        store.start_session(start("s-1", None, None)).await.unwrap();
        let old = ActionRecord {
            timestamp: Utc::now() - Duration::minutes(5),
            ..action("hero", EventKind::SectionEnter, None)
        };
        let new = action("contact", EventKind::CtaClick, None);
        store
            .append_actions("s-1", vec![old, new])
            .await
            .unwrap();

        let recent = store.recent_actions(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].section, "contact");
        assert_eq!(recent[0].session_id, "s-1");
    }

    #[tokio::test]
    async fn test_variant_names_are_unique() {
        let store = MemoryStore::new();
        store.insert_variant(variant("A", 10)).await.unwrap();
        let err = store.insert_variant(variant("A", 5)).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_list_orders_pinned_then_active_then_newest() {
        let store = MemoryStore::new();
        let mut old = variant("old", 10);
        old.created_at = Utc::now() - Duration::days(1);
        let mut inactive = variant("inactive", 10);
        inactive.active = false;
        let mut pinned = variant("pinned", 10);
        pinned.created_at = Utc::now() - Duration::days(2);
        pinned.pinned = true;
        let newest = variant("newest", 10);

        for v in [old, inactive, pinned, newest] {
            store.insert_variant(v).await.unwrap();
        }

        let names: Vec<String> = store
            .list_variants()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["pinned", "newest", "old", "inactive"]);
    }

    #[tokio::test]
    async fn test_claim_under_cap_stops_at_cap() {
        let store = MemoryStore::new();
        let capped = store.insert_variant(variant("A", 1)).await.unwrap();

        assert!(store.claim_under_cap(capped.id).await.unwrap().is_some());
        assert!(store.claim_under_cap(capped.id).await.unwrap().is_none());
        assert!(store.sample_eligible().await.unwrap().is_none());

        let forced = store.record_impression(capped.id).await.unwrap().unwrap();
        assert_eq!(forced.impressions, 2);
    }

    #[tokio::test]
    async fn test_unpin_others_keeps_target() {
        let store = MemoryStore::new();
        let mut a = variant("A", 10);
        a.pinned = true;
        let a = store.insert_variant(a).await.unwrap();
        let b = store.insert_variant(variant("B", 10)).await.unwrap();

        assert_eq!(store.unpin_others(b.id).await.unwrap(), 1);
        let a = store.find_variant(a.id).await.unwrap().unwrap();
        assert!(!a.pinned);
    }

    #[tokio::test]
    async fn test_subscribers_see_writes() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe().await;

        store.start_session(start("s-1", None, None)).await.unwrap();

        let tick = tokio::time::timeout(std::time::Duration::from_secs(1), changes.next()).await;
        assert_eq!(tick.unwrap(), Some(()));
    }
}
