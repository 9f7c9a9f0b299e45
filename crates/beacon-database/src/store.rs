//! Storage seams used by the services.
//!
//! Both the MongoDB store and the in-memory store implement every trait here,
//! so services and handlers are tested without a running database.

use async_trait::async_trait;
use beacon_core::UtcDateTime;
use beacon_entities::{
    ActionRecord, GeoProfile, SessionDocument, SessionStart, VariantDocument, VariantPatch,
    VariantRef,
};
use bson::oid::ObjectId;
use futures::stream::BoxStream;

use crate::queries::{
    CampaignKey, GeoPoint, GroupTotals, Grouping, LabelCount, LocationStats, OverviewTotals,
    RecentAction, SectionAverage,
};
use crate::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Session writes. Every write is a single atomic document operation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create or overwrite the session identified by `start.session_id`
    async fn start_session(&self, start: SessionStart) -> StoreResult<SessionDocument>;

    /// Append in order; `false` when no session has the identifier
    async fn append_actions(
        &self,
        session_id: &str,
        actions: Vec<ActionRecord>,
    ) -> StoreResult<bool>;

    /// Overwrite geo fields; `None` when no session has the identifier
    async fn update_geo(
        &self,
        session_id: &str,
        geo: GeoProfile,
    ) -> StoreResult<Option<SessionDocument>>;

    /// Record the variant shown, creating a bare session when missing
    async fn link_variant(&self, session_id: &str, variant: VariantRef) -> StoreResult<()>;

    async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionDocument>>;
}

/// Read-only aggregations over sessions
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn overview_totals(&self, active_since: UtcDateTime) -> StoreResult<OverviewTotals>;

    async fn average_time_by_section(&self) -> StoreResult<Vec<SectionAverage>>;

    async fn device_breakdown(&self, scope: Option<&CampaignKey>) -> StoreResult<Vec<LabelCount>>;

    async fn source_breakdown(&self) -> StoreResult<Vec<LabelCount>>;

    async fn location_stats(
        &self,
        scope: Option<&CampaignKey>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<LocationStats>>;

    async fn geo_points(&self) -> StoreResult<Vec<GeoPoint>>;

    async fn recent_actions(&self, limit: i64) -> StoreResult<Vec<RecentAction>>;

    /// Rows sorted by sessions then CTA clicks, both descending
    async fn group_totals(
        &self,
        grouping: Grouping,
        scope: Option<&CampaignKey>,
    ) -> StoreResult<Vec<GroupTotals>>;
}

#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Pinned first, then active, then newest
    async fn list_variants(&self) -> StoreResult<Vec<VariantDocument>>;

    /// Fails with [`StoreError::Duplicate`] when the name is taken
    async fn insert_variant(&self, variant: VariantDocument) -> StoreResult<VariantDocument>;

    async fn find_variant(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>>;

    async fn find_variant_by_name(&self, name: &str) -> StoreResult<Option<VariantDocument>>;

    async fn update_variant(
        &self,
        id: ObjectId,
        patch: &VariantPatch,
    ) -> StoreResult<Option<VariantDocument>>;

    /// Clear the pinned flag on every variant except `keep`
    async fn unpin_others(&self, keep: ObjectId) -> StoreResult<u64>;

    async fn delete_variant(&self, id: ObjectId) -> StoreResult<bool>;

    /// Count one impression regardless of cap or active flag
    async fn record_impression(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>>;

    /// Count one impression on the active pinned variant, if any
    async fn claim_pinned(&self) -> StoreResult<Option<VariantDocument>>;

    /// A uniformly random active variant still under its cap
    async fn sample_eligible(&self) -> StoreResult<Option<ObjectId>>;

    /// Count one impression only while the variant is active and under its cap
    async fn claim_under_cap(&self, id: ObjectId) -> StoreResult<Option<VariantDocument>>;
}

/// Change notifications for the live feed. Each item means "something may
/// have changed"; dropping the stream releases the underlying watch.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self) -> BoxStream<'static, ()>;
}
