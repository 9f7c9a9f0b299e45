use beacon_core::validation::{coerce_number, trim_option};
use beacon_core::{IssueCollector, Validate};
use beacon_entities::{NewVariant, VariantPatch};
use serde::Deserialize;
use utoipa::ToSchema;

const MAX_SHOW_CAP: f64 = 1_000_000.0;
const HREF_MESSAGE: &str = "Invalid URL: use http(s)://, /path, or #anchor";

/// Absolute http(s) URL, root-relative path or in-page anchor
fn is_cta_href(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || value.starts_with('/')
        || value.starts_with('#')
}

/// Shared checks for the content fields of create and update
struct ContentFields<'a> {
    name: &'a mut Option<String>,
    hero_title: &'a mut Option<String>,
    hero_sub: &'a mut Option<String>,
    cta_text: &'a mut Option<String>,
    cta_href: &'a mut Option<String>,
    show_cap: Option<f64>,
}

impl ContentFields<'_> {
    fn validate(self, issues: &mut IssueCollector) {
        for (path, value, min, max) in [
            ("name", self.name, 2, 60),
            ("heroTitle", self.hero_title, 2, 120),
            ("heroSub", self.hero_sub, 2, 200),
            ("ctaText", self.cta_text, 1, 60),
        ] {
            trim_option(value);
            if let Some(value) = value {
                issues.string_length(path, value, min, max);
            }
        }

        trim_option(self.cta_href);
        if self.cta_href.as_deref() == Some("") {
            *self.cta_href = None;
        }
        if let Some(href) = self.cta_href.as_deref() {
            if !is_cta_href(href) {
                issues.push("ctaHref", HREF_MESSAGE);
            }
        }

        if let Some(show_cap) = self.show_cap {
            issues.integer("showCap", show_cap);
            issues.number_range("showCap", show_cap, 0.0, MAX_SHOW_CAP);
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantRequest {
    #[schema(example = "Spring launch")]
    pub name: Option<String>,
    pub hero_title: Option<String>,
    pub hero_sub: Option<String>,
    /// Defaults to "Book a Free Demo"
    pub cta_text: Option<String>,
    /// Defaults to "#contact"
    pub cta_href: Option<String>,
    /// Integer, numeric strings accepted. Defaults to 10
    #[serde(default, deserialize_with = "coerce_number")]
    #[schema(value_type = Option<i64>)]
    pub show_cap: Option<f64>,
}

impl Validate for CreateVariantRequest {
    fn validate(&mut self, issues: &mut IssueCollector) {
        issues.required("name", &self.name);
        issues.required("heroTitle", &self.hero_title);
        issues.required("heroSub", &self.hero_sub);

        ContentFields {
            name: &mut self.name,
            hero_title: &mut self.hero_title,
            hero_sub: &mut self.hero_sub,
            cta_text: &mut self.cta_text,
            cta_href: &mut self.cta_href,
            show_cap: self.show_cap,
        }
        .validate(issues);
    }
}

impl CreateVariantRequest {
    pub fn into_new_variant(self) -> NewVariant {
        NewVariant {
            name: self.name.unwrap_or_default(),
            hero_title: self.hero_title.unwrap_or_default(),
            hero_sub: self.hero_sub.unwrap_or_default(),
            cta_text: self.cta_text,
            cta_href: self.cta_href,
            show_cap: self.show_cap.map(|cap| cap as i64),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVariantRequest {
    pub name: Option<String>,
    pub hero_title: Option<String>,
    pub hero_sub: Option<String>,
    pub cta_text: Option<String>,
    pub cta_href: Option<String>,
    pub active: Option<bool>,
    /// Pinning a variant unpins every other one
    pub pinned: Option<bool>,
    #[serde(default, deserialize_with = "coerce_number")]
    #[schema(value_type = Option<i64>)]
    pub show_cap: Option<f64>,
}

impl Validate for UpdateVariantRequest {
    fn validate(&mut self, issues: &mut IssueCollector) {
        ContentFields {
            name: &mut self.name,
            hero_title: &mut self.hero_title,
            hero_sub: &mut self.hero_sub,
            cta_text: &mut self.cta_text,
            cta_href: &mut self.cta_href,
            show_cap: self.show_cap,
        }
        .validate(issues);
    }
}

impl From<UpdateVariantRequest> for VariantPatch {
    fn from(request: UpdateVariantRequest) -> Self {
        VariantPatch {
            name: request.name,
            hero_title: request.hero_title,
            hero_sub: request.hero_sub,
            cta_text: request.cta_text,
            cta_href: request.cta_href,
            active: request.active,
            pinned: request.pinned,
            show_cap: request.show_cap.map(|cap| cap as i64),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignVariantRequest {
    pub session_id: Option<String>,
    /// Preview override by id; wins over `forceName`
    pub force_id: Option<String>,
    pub force_name: Option<String>,
}

impl Validate for AssignVariantRequest {
    fn validate(&mut self, issues: &mut IssueCollector) {
        if issues.required("sessionId", &self.session_id) {
            if let Some(session_id) = &self.session_id {
                issues.string_length("sessionId", session_id, 8, 64);
            }
        }
        trim_option(&mut self.force_name);
        if let Some(force_name) = &self.force_name {
            issues.string_length("forceName", force_name, 1, 60);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::validation::{decode_json, validate};

    fn paths(err: &beacon_core::ApiError) -> Vec<&str> {
        err.issues().iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn test_create_requires_content() {
        let err = validate(decode_json::<CreateVariantRequest>(b"{}").unwrap()).unwrap_err();
        assert_eq!(paths(&err), vec!["name", "heroTitle", "heroSub"]);
    }

    #[test]
    fn test_create_trims_and_coerces() {
        let body = br#"{
            "name": "  Spring  ",
            "heroTitle": "Grow faster",
            "heroSub": "With less effort",
            "ctaHref": "",
            "showCap": "25"
        }"#;
        let request = validate(decode_json::<CreateVariantRequest>(body).unwrap()).unwrap();
        let variant = request.into_new_variant();

        assert_eq!(variant.name, "Spring");
        assert_eq!(variant.cta_href, None);
        assert_eq!(variant.show_cap, Some(25));
    }

    #[test]
    fn test_cta_href_forms() {
        assert!(is_cta_href("https://example.com/demo"));
        assert!(is_cta_href("HTTP://example.com"));
        assert!(is_cta_href("/pricing"));
        assert!(is_cta_href("#contact"));
        assert!(!is_cta_href("mailto:sales@example.com"));
        assert!(!is_cta_href("example.com"));
    }

    #[test]
    fn test_show_cap_bounds() {
        let fractional = decode_json::<UpdateVariantRequest>(br#"{"showCap": 2.5}"#).unwrap();
        let err = validate(fractional).unwrap_err();
        assert_eq!(err.issues()[0].message, "Expected integer, received float");

        let huge = decode_json::<UpdateVariantRequest>(br#"{"showCap": 2000000}"#).unwrap();
        assert!(validate(huge).is_err());

        let negative = decode_json::<UpdateVariantRequest>(br#"{"showCap": -1}"#).unwrap();
        assert!(validate(negative).is_err());
    }

    #[test]
    fn test_update_maps_to_patch() {
        let body = br#"{ "pinned": true, "ctaHref": "mailto:x" }"#;
        let err = validate(decode_json::<UpdateVariantRequest>(body).unwrap()).unwrap_err();
        assert_eq!(paths(&err), vec!["ctaHref"]);

        let body = br#"{ "pinned": true, "active": false, "showCap": 3 }"#;
        let patch: VariantPatch = validate(decode_json::<UpdateVariantRequest>(body).unwrap())
            .unwrap()
            .into();
        assert_eq!(patch.pinned, Some(true));
        assert_eq!(patch.active, Some(false));
        assert_eq!(patch.show_cap, Some(3));
        assert_eq!(patch.name, None);
    }

    #[test]
    fn test_assign_rules() {
        let err = validate(
            decode_json::<AssignVariantRequest>(br#"{"sessionId": "s", "forceName": "  "}"#)
                .unwrap(),
        )
        .unwrap_err();
        assert_eq!(paths(&err), vec!["sessionId", "forceName"]);

        let ok = validate(
            decode_json::<AssignVariantRequest>(br#"{"sessionId": "s-aaaaaaaa", "forceId": "nope"}"#)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(ok.force_id.as_deref(), Some("nope"));
    }
}
