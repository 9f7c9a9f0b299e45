//! MongoDB-backed stores

mod change_feed;
pub mod pipelines;

use std::time::Duration;

use async_trait::async_trait;
use beacon_core::UtcDateTime;
use beacon_entities::{
    ActionRecord, GeoProfile, SessionDocument, SessionStart, VariantDocument, VariantPatch,
    VariantRef,
};
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use chrono::Utc;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::queries::{
    CampaignKey, GeoPoint, GroupTotals, Grouping, LabelCount, LocationStats, OverviewTotals,
    RecentAction, SectionAverage,
};
use crate::store::{AnalyticsStore, ChangeFeed, SessionStore, StoreResult, VariantStore};
use crate::StoreError;

pub const SESSIONS_COLLECTION: &str = "sessions";
pub const VARIANTS_COLLECTION: &str = "variants";

/// Every store trait over one database handle
#[derive(Clone)]
pub struct MongoStore {
    sessions: Collection<SessionDocument>,
    variants: Collection<VariantDocument>,
    poll_interval: Duration,
}

impl MongoStore {
    pub fn new(database: &Database, poll_interval: Duration) -> Self {
        Self {
            sessions: database.collection(SESSIONS_COLLECTION),
            variants: database.collection(VARIANTS_COLLECTION),
            poll_interval,
        }
    }

    async fn aggregate_sessions<T: DeserializeOwned>(
        &self,
        pipeline: Vec<Document>,
    ) -> StoreResult<Vec<T>> {
        let rows: Vec<Document> = self.sessions.aggregate(pipeline).await?.try_collect().await?;
        rows.into_iter()
            .map(|row| bson::from_document(row).map_err(Into::into))
            .collect()
    }

    async fn count_cta_clicks(&self) -> StoreResult<i64> {
        let rows: Vec<Document> = self
            .sessions
            .aggregate(pipelines::cta_clicks())
            .await?
            .try_collect()
            .await?;

        Ok(rows
            .first()
            .and_then(|row| match row.get("count") {
                Some(Bson::Int32(n)) => Some(i64::from(*n)),
                Some(Bson::Int64(n)) => Some(*n),
                _ => None,
            })
            .unwrap_or(0))
    }

    async fn count_unique_ips(&self, filter: Document) -> StoreResult<i64> {
        let ips = self.sessions.distinct("ip", filter).await?;
        Ok(ips
            .iter()
            .filter(|ip| matches!(ip, Bson::String(value) if !value.is_empty()))
            .count() as i64)
    }
}

fn start_update(start: &SessionStart, now: UtcDateTime) -> StoreResult<Document> {
    let now = bson::DateTime::from_chrono(now);
    let mut set = doc! {
        "utm_source": start.utm.source.clone(),
        "utm_medium": start.utm.medium.clone(),
        "utm_campaign": start.utm.campaign.clone(),
        "utm_content": start.utm.content.clone(),
        "utm_term": start.utm.term.clone(),
        "pageUrl": start.page_url.clone(),
        "referrer": start.referrer.clone(),
        "variantId": start.variant.id.clone(),
        "variantName": start.variant.name.clone(),
        "device": start.device.device_type.as_str(),
        "userAgent": start.user_agent.as_str(),
        "ip": start.ip.clone(),
        "updatedAt": now,
    };

    let device = &start.device;
    for (field, value) in [
        ("osName", &device.os_name),
        ("osVersion", &device.os_version),
        ("browserName", &device.browser_name),
        ("browserVersion", &device.browser_version),
        ("deviceVendor", &device.vendor),
        ("deviceModel", &device.model),
    ] {
        set_present(&mut set, field, value);
    }
    for (field, value) in geo_fields(&start.geo)? {
        set.insert(field, value);
    }

    Ok(doc! {
        "$set": set,
        "$setOnInsert": {
            "createdAt": now,
            "actions": [],
        },
    })
}

/// Geo fields to overwrite; unresolved detail is left out so stored values survive
fn geo_fields(geo: &GeoProfile) -> StoreResult<Document> {
    let mut set = Document::new();
    for (field, value) in [
        ("country", &geo.country),
        ("countryCode", &geo.country_code),
        ("city", &geo.city),
        ("region", &geo.region),
    ] {
        set_present(&mut set, field, value);
    }
    if let Some(lat) = geo.lat {
        set.insert("lat", lat);
    }
    if let Some(lon) = geo.lon {
        set.insert("lon", lon);
    }
    set.insert("geoMethod", bson::to_bson(&geo.method)?);
    set.insert("location", geo.display_location());
    Ok(set)
}

fn set_present(set: &mut Document, field: &str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
        set.insert(field, value);
    }
}

fn variant_id_filter(id: ObjectId) -> Document {
    doc! { "_id": id }
}

fn impression() -> Document {
    doc! { "$inc": { "impressions": 1 } }
}

#[async_trait]
impl SessionStore for MongoStore {
    async fn start_session(&self, start: SessionStart) -> StoreResult<SessionDocument> {
        let update = start_update(&start, Utc::now())?;

        let stored = self
            .sessions
            .find_one_and_update(doc! { "sessionId": start.session_id.as_str() }, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?;

        match stored {
            Some(session) => Ok(session),
            // an upsert returning the new document should never come back empty
            None => self.find_session(&start.session_id).await?.ok_or_else(|| {
                StoreError::Serialization("upserted session was not returned".into())
            }),
        }
    }

    async fn append_actions(
        &self,
        session_id: &str,
        actions: Vec<ActionRecord>,
    ) -> StoreResult<bool> {
        let count = actions.len();
        let actions = bson::to_bson(&actions)?;

        let result = self
            .sessions
            .update_one(
                doc! { "sessionId": session_id },
                doc! {
                    "$push": { "actions": { "$each": actions } },
                    "$set": { "updatedAt": bson::DateTime::from_chrono(Utc::now()) },
                },
            )
            .await?;

        debug!(
            "Appended {} actions to session {} (matched {})",
            count, session_id, result.matched_count
        );
        Ok(result.matched_count > 0)
    }

    async fn update_geo(
        &self,
        session_id: &str,
        geo: GeoProfile,
    ) -> StoreResult<Option<SessionDocument>> {
        let mut set = geo_fields(&geo)?;
        set.insert("updatedAt", bson::DateTime::from_chrono(Utc::now()));

        let updated = self
            .sessions
            .find_one_and_update(doc! { "sessionId": session_id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    async fn link_variant(&self, session_id: &str, variant: VariantRef) -> StoreResult<()> {
        let now = bson::DateTime::from_chrono(Utc::now());
        self.sessions
            .update_one(
                doc! { "sessionId": session_id },
                doc! {
                    "$set": {
                        "variantId": variant.id,
                        "variantName": variant.name,
                        "updatedAt": now,
                    },
                    "$setOnInsert": {
                        "createdAt": now,
                        "actions": [],
                    },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionDocument>> {
        Ok(self
            .sessions
            .find_one(doc! { "sessionId": session_id })
            .await?)
    }
}

#[async_trait]
impl AnalyticsStore for MongoStore {
    async fn overview_totals(&self, active_since: UtcDateTime) -> StoreResult<OverviewTotals> {
        let sessions = self.sessions.estimated_document_count().await? as i64;
        let unique_users = self.count_unique_ips(Document::new()).await?;
        let active_users = self
            .count_unique_ips(doc! {
                "updatedAt": { "$gte": bson::DateTime::from_chrono(active_since) }
            })
            .await?;
        let cta_clicks = self.count_cta_clicks().await?;

        Ok(OverviewTotals {
            sessions,
            unique_users,
            active_users,
            cta_clicks,
        })
    }

    async fn average_time_by_section(&self) -> StoreResult<Vec<SectionAverage>> {
        self.aggregate_sessions(pipelines::average_time_by_section())
            .await
    }

    async fn device_breakdown(&self, scope: Option<&CampaignKey>) -> StoreResult<Vec<LabelCount>> {
        self.aggregate_sessions(pipelines::device_breakdown(scope))
            .await
    }

    async fn source_breakdown(&self) -> StoreResult<Vec<LabelCount>> {
        self.aggregate_sessions(pipelines::source_breakdown()).await
    }

    async fn location_stats(
        &self,
        scope: Option<&CampaignKey>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<LocationStats>> {
        self.aggregate_sessions(pipelines::location_stats(scope, limit))
            .await
    }

    async fn geo_points(&self) -> StoreResult<Vec<GeoPoint>> {
        self.aggregate_sessions(pipelines::geo_points()).await
    }

    async fn recent_actions(&self, limit: i64) -> StoreResult<Vec<RecentAction>> {
        self.aggregate_sessions(pipelines::recent_actions(limit))
            .await
    }

    async fn group_totals(
        &self,
        grouping: Grouping,
        scope: Option<&CampaignKey>,
    ) -> StoreResult<Vec<GroupTotals>> {
        self.aggregate_sessions(pipelines::group_totals(grouping, scope))
            .await
    }
}

#[async_trait]
impl VariantStore for MongoStore {
    async fn list_variants(&self) -> StoreResult<Vec<VariantDocument>> {
        let variants = self
            .variants
            .find(Document::new())
            .sort(doc! { "pinned": -1, "active": -1, "createdAt": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(variants)
    }

    async fn insert_variant(&self, variant: VariantDocument) -> StoreResult<VariantDocument> {
        self.variants.insert_one(&variant).await?;
        Ok(variant)
    }

    async fn find_variant(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>> {
        Ok(self.variants.find_one(variant_id_filter(id)).await?)
    }

    async fn find_variant_by_name(&self, name: &str) -> StoreResult<Option<VariantDocument>> {
        Ok(self.variants.find_one(doc! { "name": name }).await?)
    }

    async fn update_variant(
        &self,
        id: ObjectId,
        patch: &VariantPatch,
    ) -> StoreResult<Option<VariantDocument>> {
        let updated = self
            .variants
            .find_one_and_update(
                variant_id_filter(id),
                doc! { "$set": patch.to_set_document(Utc::now()) },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    async fn unpin_others(&self, keep: ObjectId) -> StoreResult<u64> {
        let result = self
            .variants
            .update_many(
                doc! { "_id": { "$ne": keep }, "pinned": true },
                doc! { "$set": {
                    "pinned": false,
                    "updatedAt": bson::DateTime::from_chrono(Utc::now()),
                } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn delete_variant(&self, id: ObjectId) -> StoreResult<bool> {
        let result = self.variants.delete_one(variant_id_filter(id)).await?;
        Ok(result.deleted_count > 0)
    }

    async fn record_impression(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>> {
        let updated = self
            .variants
            .find_one_and_update(variant_id_filter(id), impression())
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    async fn claim_pinned(&self) -> StoreResult<Option<VariantDocument>> {
        let updated = self
            .variants
            .find_one_and_update(doc! { "pinned": true, "active": true }, impression())
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    async fn sample_eligible(&self) -> StoreResult<Option<ObjectId>> {
        let rows: Vec<Document> = self
            .variants
            .aggregate(pipelines::eligible_sample())
            .await?
            .try_collect()
            .await?;
        Ok(rows.first().and_then(|row| row.get_object_id("_id").ok()))
    }

    async fn claim_under_cap(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>> {
        let mut filter = pipelines::under_cap_filter();
        filter.insert("_id", id);

        let updated = self
            .variants
            .find_one_and_update(filter, impression())
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }
}

#[async_trait]
impl ChangeFeed for MongoStore {
    async fn subscribe(&self) -> BoxStream<'static, ()> {
        change_feed::subscribe(self.sessions.clone(), self.poll_interval).await
    }
}
