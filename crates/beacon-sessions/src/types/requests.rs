use beacon_core::problem::validation_error;
use beacon_core::validation::{trim_in_place, trim_option};
use beacon_core::{ApiError, IssueCollector, Validate};
use beacon_entities::{EventKind, Utm, VariantRef};
use beacon_geo::Coordinates;
use serde::Deserialize;
use utoipa::ToSchema;

pub const MAX_ACTIONS_PER_BATCH: usize = 20;
const MAX_TIME_SPENT_SECONDS: f64 = 36_000.0;

/// Campaign parameters as captured from the landing URL
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UtmInput {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
}

impl UtmInput {
    fn validate(&mut self, issues: &mut IssueCollector) {
        for (name, value) in [
            ("utm_source", &mut self.utm_source),
            ("utm_medium", &mut self.utm_medium),
            ("utm_campaign", &mut self.utm_campaign),
            ("utm_content", &mut self.utm_content),
            ("utm_term", &mut self.utm_term),
        ] {
            trim_option(value);
            if let Some(value) = value {
                issues.string_length(&format!("utm.{name}"), value, 1, 200);
            }
        }
    }
}

impl From<UtmInput> for Utm {
    fn from(utm: UtmInput) -> Self {
        Utm {
            source: utm.utm_source,
            medium: utm.utm_medium,
            campaign: utm.utm_campaign,
            content: utm.utm_content,
            term: utm.utm_term,
        }
    }
}

/// Variant the page rendered, as reported by the client
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct VariantRefInput {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// Client-generated identifier, 8 to 64 characters
    #[schema(example = "3f0b2c4e-6a1d-4d5e-9b7a-2c1e0f9a8b7c")]
    pub session_id: Option<String>,
    pub utm: Option<UtmInput>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub variant: Option<VariantRefInput>,
    /// Legacy flat variant reference, used when `variant` is absent
    pub variant_id: Option<String>,
    pub variant_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl StartSessionRequest {
    /// Nested reference wins; the flat legacy fields fill whatever it leaves out
    pub fn variant_ref(&self) -> VariantRef {
        let nested = self.variant.clone().unwrap_or_default();
        VariantRef {
            id: nested.id.or_else(|| self.variant_id.clone()),
            name: nested.name.or_else(|| self.variant_name.clone()),
        }
    }
}

impl Validate for StartSessionRequest {
    fn validate(&mut self, issues: &mut IssueCollector) {
        if issues.required("sessionId", &self.session_id) {
            if let Some(session_id) = &self.session_id {
                issues.string_length("sessionId", session_id, 8, 64);
            }
        }
        if let Some(utm) = self.utm.as_mut() {
            utm.validate(issues);
        }
        if let Some(page_url) = &self.page_url {
            issues.url("pageUrl", page_url);
        }
        if let Some(referrer) = &self.referrer {
            issues.url("referrer", referrer);
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionInput {
    #[schema(example = "hero")]
    pub section: String,
    pub event: EventKind,
    /// Seconds, 0 to 36000
    pub time_spent: Option<f64>,
    /// RFC 3339; arrival time when absent
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AppendActionsRequest {
    pub actions: Option<Vec<ActionInput>>,
}

impl Validate for AppendActionsRequest {
    fn validate(&mut self, issues: &mut IssueCollector) {
        if !issues.required("actions", &self.actions) {
            return;
        }
        let Some(actions) = self.actions.as_mut() else {
            return;
        };

        issues.array_length("actions", actions.len(), 1, MAX_ACTIONS_PER_BATCH);
        for (index, action) in actions.iter_mut().enumerate() {
            trim_in_place(&mut action.section);
            issues.string_length(&format!("actions.{index}.section"), &action.section, 1, 64);
            if let Some(time_spent) = action.time_spent {
                issues.number_range(
                    &format!("actions.{index}.timeSpent"),
                    time_spent,
                    0.0,
                    MAX_TIME_SPENT_SECONDS,
                );
            }
            if let Some(timestamp) = &action.timestamp {
                issues.datetime(&format!("actions.{index}.timestamp"), timestamp);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateGeoRequest {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl UpdateGeoRequest {
    fn check(&self, issues: &mut IssueCollector) {
        issues.required("lat", &self.lat);
        issues.required("lon", &self.lon);
    }

    /// Both coordinates, or the same issues validation reports
    pub fn coordinates(&self) -> Result<Coordinates, ApiError> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Ok(Coordinates { lat, lon }),
            _ => {
                let mut issues = IssueCollector::new();
                self.check(&mut issues);
                Err(validation_error().with_issues(issues.issues().to_vec()))
            }
        }
    }
}

impl Validate for UpdateGeoRequest {
    fn validate(&mut self, issues: &mut IssueCollector) {
        self.check(issues);
    }
}
