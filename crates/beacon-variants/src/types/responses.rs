use beacon_core::{iso_millis, ResponseContract, UtcDateTime};
use beacon_entities::VariantDocument;
use serde::Serialize;
use utoipa::ToSchema;

/// Variant as sent to clients, id rendered as a hex string
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantView {
    #[serde(rename = "_id")]
    #[schema(example = "65f0c0ffee0000000000000a")]
    pub id: String,
    pub name: String,
    pub hero_title: String,
    pub hero_sub: String,
    pub cta_text: String,
    pub cta_href: String,
    pub active: bool,
    pub pinned: bool,
    pub show_cap: i64,
    pub impressions: i64,
    #[serde(serialize_with = "iso_millis::serialize")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
    #[serde(serialize_with = "iso_millis::serialize")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: UtcDateTime,
}

impl From<VariantDocument> for VariantView {
    fn from(doc: VariantDocument) -> Self {
        Self {
            id: doc.id.to_hex(),
            name: doc.name,
            hero_title: doc.hero_title,
            hero_sub: doc.hero_sub,
            cta_text: doc.cta_text,
            cta_href: doc.cta_href,
            active: doc.active,
            pinned: doc.pinned,
            show_cap: doc.show_cap,
            impressions: doc.impressions,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VariantListResponse {
    pub ok: bool,
    pub variants: Vec<VariantView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VariantResponse {
    pub ok: bool,
    pub variant: VariantView,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeleteVariantResponse {
    pub ok: bool,
}

/// `variant` is null when nothing was eligible
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssignVariantResponse {
    pub ok: bool,
    pub variant: Option<VariantView>,
}

impl ResponseContract for AssignVariantResponse {
    fn check(&self) -> Result<(), String> {
        if !self.ok {
            return Err("ok must be true".into());
        }
        let Some(variant) = &self.variant else {
            return Ok(());
        };
        if variant.id.len() != 24 {
            return Err(format!("variant._id is not an object id: {}", variant.id));
        }
        if variant.name.is_empty() || variant.hero_title.is_empty() || variant.hero_sub.is_empty()
        {
            return Err("variant content fields must not be empty".into());
        }
        if variant.impressions < 0 || variant.show_cap < 0 {
            return Err("variant counters must be non-negative".into());
        }
        Ok(())
    }
}

/// Performance of one variant, joined with its stored settings
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantPerformance {
    pub variant_id: Option<String>,
    pub variant_name: Option<String>,
    /// Session's recorded name, else the variant's current name, else "(unknown)"
    pub name: String,
    pub sessions: i64,
    pub users: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub avg_hero: f64,
    pub avg_services: f64,
    pub avg_contact: f64,
    pub impressions: i64,
    pub show_cap: i64,
    pub active: bool,
    pub pinned: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VariantPerformanceResponse {
    pub ok: bool,
    pub variants: Vec<VariantPerformance>,
}
