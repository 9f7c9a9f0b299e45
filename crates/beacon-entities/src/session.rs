use beacon_core::UtcDateTime;
use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Interaction event kinds accepted from the site beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum EventKind {
    #[serde(rename = "CTA_Click")]
    CtaClick,
    SectionEnter,
    SectionExit,
    SectionTime,
    Scrolled,
    ReachedEnd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CtaClick => "CTA_Click",
            EventKind::SectionEnter => "SectionEnter",
            EventKind::SectionExit => "SectionExit",
            EventKind::SectionTime => "SectionTime",
            EventKind::Scrolled => "Scrolled",
            EventKind::ReachedEnd => "ReachedEnd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }
}

/// How the geographic fields were resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GeoMethod {
    Gps,
    Ip,
    Error,
}

/// One interaction event embedded in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub section: String,
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<f64>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: UtcDateTime,
}

/// UTM campaign parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utm {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub content: Option<String>,
    pub term: Option<String>,
}

/// Non-owning reference from a session to the variant it was shown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Device attributes resolved from a user-agent string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub device_type: DeviceType,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Desktop,
            os_name: None,
            os_version: None,
            browser_name: None,
            browser_version: None,
            vendor: None,
            model: None,
        }
    }
}

/// Geographic attributes from a best-effort lookup
#[derive(Debug, Clone, PartialEq)]
pub struct GeoProfile {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub method: GeoMethod,
}

impl GeoProfile {
    /// Result of a lookup that could not resolve anything
    pub fn unresolved() -> Self {
        Self {
            country: None,
            country_code: None,
            city: None,
            region: None,
            lat: None,
            lon: None,
            method: GeoMethod::Error,
        }
    }

    /// `"<city>, <country or code>"`, skipping empty parts, or `"Unknown"`.
    pub fn display_location(&self) -> String {
        let country = non_empty(&self.country).or_else(|| non_empty(&self.country_code));
        let parts: Vec<&str> = [non_empty(&self.city), country]
            .into_iter()
            .flatten()
            .collect();

        if parts.is_empty() {
            "Unknown".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Everything the start-session call writes
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    pub session_id: String,
    pub utm: Utm,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub variant: VariantRef,
    pub device: DeviceProfile,
    pub user_agent: String,
    pub ip: Option<String>,
    pub geo: GeoProfile,
}

/// Stored visitor session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub session_id: String,

    #[serde(rename = "utm_source")]
    pub utm_source: Option<String>,
    #[serde(rename = "utm_medium")]
    pub utm_medium: Option<String>,
    #[serde(rename = "utm_campaign")]
    pub utm_campaign: Option<String>,
    #[serde(rename = "utm_content")]
    pub utm_content: Option<String>,
    #[serde(rename = "utm_term")]
    pub utm_term: Option<String>,

    pub device: Option<DeviceType>,
    pub user_agent: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub device_vendor: Option<String>,
    pub device_model: Option<String>,

    pub ip: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub geo_method: Option<GeoMethod>,
    pub location: Option<String>,

    pub page_url: Option<String>,
    pub referrer: Option<String>,

    pub variant_id: Option<String>,
    pub variant_name: Option<String>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: UtcDateTime,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: UtcDateTime,

    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

impl SessionDocument {
    /// Bare record created by the first write for an identifier
    pub fn new(session_id: impl Into<String>, now: UtcDateTime) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            utm_content: None,
            utm_term: None,
            device: None,
            user_agent: None,
            os_name: None,
            os_version: None,
            browser_name: None,
            browser_version: None,
            device_vendor: None,
            device_model: None,
            ip: None,
            country: None,
            country_code: None,
            city: None,
            region: None,
            lat: None,
            lon: None,
            geo_method: None,
            location: None,
            page_url: None,
            referrer: None,
            variant_id: None,
            variant_name: None,
            created_at: now,
            updated_at: now,
            actions: Vec::new(),
        }
    }

    /// Overwrite the mutable fields from a start-session call.
    ///
    /// Campaign, page, variant, device type, user agent, IP and geo method are
    /// always replaced; fingerprint and geo detail only when resolved, so a
    /// later failed lookup keeps an earlier success.
    pub fn apply_start(&mut self, start: &SessionStart, now: UtcDateTime) {
        self.utm_source = start.utm.source.clone();
        self.utm_medium = start.utm.medium.clone();
        self.utm_campaign = start.utm.campaign.clone();
        self.utm_content = start.utm.content.clone();
        self.utm_term = start.utm.term.clone();

        self.variant_id = start.variant.id.clone();
        self.variant_name = start.variant.name.clone();

        self.device = Some(start.device.device_type);
        self.user_agent = Some(start.user_agent.clone());
        set_if_some(&mut self.os_name, &start.device.os_name);
        set_if_some(&mut self.os_version, &start.device.os_version);
        set_if_some(&mut self.browser_name, &start.device.browser_name);
        set_if_some(&mut self.browser_version, &start.device.browser_version);
        set_if_some(&mut self.device_vendor, &start.device.vendor);
        set_if_some(&mut self.device_model, &start.device.model);

        self.ip = start.ip.clone();
        self.apply_geo(&start.geo, now);

        self.page_url = start.page_url.clone();
        self.referrer = start.referrer.clone();
        self.updated_at = now;
    }

    /// Overwrite geographic fields; unresolved parts keep their stored value.
    pub fn apply_geo(&mut self, geo: &GeoProfile, now: UtcDateTime) {
        set_if_some(&mut self.country, &geo.country);
        set_if_some(&mut self.country_code, &geo.country_code);
        set_if_some(&mut self.city, &geo.city);
        set_if_some(&mut self.region, &geo.region);
        if geo.lat.is_some() {
            self.lat = geo.lat;
        }
        if geo.lon.is_some() {
            self.lon = geo.lon;
        }
        self.geo_method = Some(geo.method);
        self.location = Some(geo.display_location());
        self.updated_at = now;
    }

    pub fn apply_variant(&mut self, variant: &VariantRef, now: UtcDateTime) {
        self.variant_id = variant.id.clone();
        self.variant_name = variant.name.clone();
        self.updated_at = now;
    }
}

fn set_if_some(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
        *target = Some(value.clone());
    }
}
