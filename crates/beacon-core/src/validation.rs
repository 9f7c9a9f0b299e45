//! Strict request body validation
//!
//! Bodies are decoded with `serde_path_to_error` so type errors carry the path
//! of the offending field, then handed to the type's [`Validate`] impl which
//! normalizes the value and records every remaining violation. Handlers only
//! ever see a value that passed both steps.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_path_to_error::{Path, Segment};
use tracing::debug;

use crate::problem::{validation_error, ApiError, Issue};

/// Implemented by request bodies that need checks beyond their serde shape.
pub trait Validate {
    /// Normalize the value in place (trimming, defaulting) and record every
    /// violation into `issues`.
    fn validate(&mut self, issues: &mut IssueCollector);
}

/// Collects field violations so a single response can report all of them.
#[derive(Debug, Default)]
pub struct IssueCollector {
    issues: Vec<Issue>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue::new(path, message));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Records `Required` when the value is absent. Returns whether it was present.
    pub fn required<T>(&mut self, path: &str, value: &Option<T>) -> bool {
        if value.is_none() {
            self.push(path, "Required");
            return false;
        }
        true
    }

    /// Length bounds counted in characters, both inclusive.
    pub fn string_length(&mut self, path: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min {
            self.push(
                path,
                format!("String must contain at least {} character(s)", min),
            );
        } else if len > max {
            self.push(
                path,
                format!("String must contain at most {} character(s)", max),
            );
        }
    }

    pub fn number_range(&mut self, path: &str, value: f64, min: f64, max: f64) {
        if !value.is_finite() {
            self.push(path, "Expected number, received nan");
        } else if value < min {
            self.push(
                path,
                format!("Number must be greater than or equal to {}", min),
            );
        } else if value > max {
            self.push(path, format!("Number must be less than or equal to {}", max));
        }
    }

    pub fn integer(&mut self, path: &str, value: f64) {
        if value.fract() != 0.0 {
            self.push(path, "Expected integer, received float");
        }
    }

    pub fn array_length(&mut self, path: &str, len: usize, min: usize, max: usize) {
        if len < min {
            self.push(path, format!("Array must contain at least {} element(s)", min));
        } else if len > max {
            self.push(path, format!("Array must contain at most {} element(s)", max));
        }
    }

    /// Absolute URL with a scheme.
    pub fn url(&mut self, path: &str, value: &str) {
        if url::Url::parse(value).is_err() {
            self.push(path, "Invalid url");
        }
    }

    /// RFC 3339 timestamp.
    pub fn datetime(&mut self, path: &str, value: &str) {
        if chrono::DateTime::parse_from_rfc3339(value).is_err() {
            self.push(path, "Invalid datetime");
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(validation_error().with_issues(self.issues))
        }
    }
}

/// Trim surrounding whitespace in place.
pub fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

pub fn trim_option(value: &mut Option<String>) {
    if let Some(inner) = value.as_mut() {
        trim_in_place(inner);
    }
}

/// Accepts a JSON number or a numeric string. `null` and absence map to `None`.
pub fn coerce_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(f64),
        Text(String),
    }

    match Option::<Lenient>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Lenient::Number(n)) => Ok(Some(n)),
        Some(Lenient::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom("Expected number, received nan")),
    }
}

/// Dotted issue path, array indices included: `actions.0.event`.
fn issue_path(path: &Path) -> String {
    let segments: Vec<String> = path
        .iter()
        .map(|segment| match segment {
            Segment::Seq { index } => index.to_string(),
            other => other.to_string(),
        })
        .collect();
    if segments.is_empty() {
        "body".to_string()
    } else {
        segments.join(".")
    }
}

/// Decode a JSON body into `T`, reporting failures as `ValidationError` issues.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let deserializer = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = issue_path(err.path());
        let message = err.inner().to_string();
        debug!("Rejected request body at {}: {}", path, message);
        validation_error().issue(path, message)
    })
}

/// Validate an already decoded value.
pub fn validate<T: Validate>(mut value: T) -> Result<T, ApiError> {
    let mut issues = IssueCollector::new();
    value.validate(&mut issues);
    issues.finish()?;
    Ok(value)
}

/// JSON extractor that runs [`Validate`] before the handler sees the body.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                let mime = value.split(';').next().unwrap_or_default().trim();
                mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
            })
            .unwrap_or(false);

        if !is_json {
            return Err(validation_error().issue("body", "Expected a JSON request body"));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| validation_error().issue("body", "Unable to read request body"))?;

        let value = decode_json::<T>(&bytes)?;
        validate(value).map(ValidatedJson)
    }
}
