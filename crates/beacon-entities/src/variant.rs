use beacon_core::UtcDateTime;
use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CTA_TEXT: &str = "Book a Free Demo";
pub const DEFAULT_CTA_HREF: &str = "#contact";
pub const DEFAULT_SHOW_CAP: i64 = 10;

/// Stored split-test variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub hero_title: String,
    pub hero_sub: String,
    pub cta_text: String,
    pub cta_href: String,
    pub active: bool,
    pub pinned: bool,
    /// Maximum impressions obtainable through random assignment
    pub show_cap: i64,
    pub impressions: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: UtcDateTime,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: UtcDateTime,
}

impl VariantDocument {
    /// Eligible for random assignment
    pub fn has_capacity(&self) -> bool {
        self.active && self.impressions < self.show_cap
    }
}

/// Validated create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVariant {
    pub name: String,
    pub hero_title: String,
    pub hero_sub: String,
    pub cta_text: Option<String>,
    pub cta_href: Option<String>,
    pub show_cap: Option<i64>,
}

impl NewVariant {
    pub fn into_document(self, now: UtcDateTime) -> VariantDocument {
        VariantDocument {
            id: ObjectId::new(),
            name: self.name,
            hero_title: self.hero_title,
            hero_sub: self.hero_sub,
            cta_text: self.cta_text.unwrap_or_else(|| DEFAULT_CTA_TEXT.to_string()),
            cta_href: self.cta_href.unwrap_or_else(|| DEFAULT_CTA_HREF.to_string()),
            active: true,
            pinned: false,
            show_cap: self.show_cap.unwrap_or(DEFAULT_SHOW_CAP),
            impressions: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validated partial update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantPatch {
    pub name: Option<String>,
    pub hero_title: Option<String>,
    pub hero_sub: Option<String>,
    pub cta_text: Option<String>,
    pub cta_href: Option<String>,
    pub active: Option<bool>,
    pub pinned: Option<bool>,
    pub show_cap: Option<i64>,
}

impl VariantPatch {
    pub fn apply(&self, doc: &mut VariantDocument, now: UtcDateTime) {
        if let Some(name) = &self.name {
            doc.name = name.clone();
        }
        if let Some(hero_title) = &self.hero_title {
            doc.hero_title = hero_title.clone();
        }
        if let Some(hero_sub) = &self.hero_sub {
            doc.hero_sub = hero_sub.clone();
        }
        if let Some(cta_text) = &self.cta_text {
            doc.cta_text = cta_text.clone();
        }
        if let Some(cta_href) = &self.cta_href {
            doc.cta_href = cta_href.clone();
        }
        if let Some(active) = self.active {
            doc.active = active;
        }
        if let Some(pinned) = self.pinned {
            doc.pinned = pinned;
        }
        if let Some(show_cap) = self.show_cap {
            doc.show_cap = show_cap;
        }
        doc.updated_at = now;
    }

    /// Fields to `$set`, keyed by their stored names
    pub fn to_set_document(&self, now: UtcDateTime) -> bson::Document {
        let mut set = bson::Document::new();
        if let Some(name) = &self.name {
            set.insert("name", name.as_str());
        }
        if let Some(hero_title) = &self.hero_title {
            set.insert("heroTitle", hero_title.as_str());
        }
        if let Some(hero_sub) = &self.hero_sub {
            set.insert("heroSub", hero_sub.as_str());
        }
        if let Some(cta_text) = &self.cta_text {
            set.insert("ctaText", cta_text.as_str());
        }
        if let Some(cta_href) = &self.cta_href {
            set.insert("ctaHref", cta_href.as_str());
        }
        if let Some(active) = self.active {
            set.insert("active", active);
        }
        if let Some(pinned) = self.pinned {
            set.insert("pinned", pinned);
        }
        if let Some(show_cap) = self.show_cap {
            set.insert("showCap", show_cap);
        }
        set.insert("updatedAt", bson::DateTime::from_chrono(now));
        set
    }
}
