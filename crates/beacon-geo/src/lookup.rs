use std::time::Duration;

use beacon_config::GeoSettings;
use beacon_entities::{GeoMethod, GeoProfile};
use rand::seq::SliceRandom;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ip::is_unroutable;

pub const OPENCAGE_BASE_URL: &str = "https://api.opencagedata.com";
pub const IPINFO_BASE_URL: &str = "https://ipinfo.io";

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("{0} is not configured")]
    MissingCredentials(&'static str),
    #[error("Lookup request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Provider answered HTTP {0}")]
    Status(u16),
    #[error("Address {0} cannot be located")]
    Unroutable(String),
    #[error("Provider returned no result")]
    Empty,
}

/// Client-reported position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    #[serde(default)]
    components: OpenCageComponents,
}

#[derive(Debug, Default, Deserialize)]
struct OpenCageComponents {
    country: Option<String>,
    country_code: Option<String>,
    state: Option<String>,
    province: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
    loc: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse ipinfo's `"lat,lon"`
fn parse_loc(loc: &str) -> Option<Coordinates> {
    let (lat, lon) = loc.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then_some(Coordinates { lat, lon })
}

/// Lookups against OpenCage (coordinates) and ipinfo (addresses)
pub struct RemoteGeoLookup {
    client: reqwest::Client,
    opencage_key: Option<String>,
    ipinfo_token: Option<String>,
    opencage_base_url: String,
    ipinfo_base_url: String,
    coordinate_timeout: Duration,
    ip_timeout: Duration,
}

impl RemoteGeoLookup {
    pub fn new(settings: &GeoSettings) -> Self {
        Self::with_base_urls(settings, OPENCAGE_BASE_URL, IPINFO_BASE_URL)
    }

    /// Point the providers at other hosts (used by tests)
    pub fn with_base_urls(
        settings: &GeoSettings,
        opencage_base_url: impl Into<String>,
        ipinfo_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            opencage_key: settings.opencage_key.clone(),
            ipinfo_token: settings.ipinfo_token.clone(),
            opencage_base_url: opencage_base_url.into().trim_end_matches('/').to_string(),
            ipinfo_base_url: ipinfo_base_url.into().trim_end_matches('/').to_string(),
            coordinate_timeout: settings.coordinate_timeout,
            ip_timeout: settings.ip_timeout,
        }
    }

    pub async fn reverse_geocode(&self, coords: Coordinates) -> Result<GeoProfile, GeoError> {
        let key = self
            .opencage_key
            .as_deref()
            .ok_or(GeoError::MissingCredentials("OpenCage key"))?;

        let response = self
            .client
            .get(format!("{}/geocode/v1/json", self.opencage_base_url))
            .query(&[("q", format!("{},{}", coords.lat, coords.lon)), ("key", key.to_string())])
            .timeout(self.coordinate_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status().as_u16()));
        }

        let body: OpenCageResponse = response.json().await?;
        let components = body
            .results
            .into_iter()
            .next()
            .ok_or(GeoError::Empty)?
            .components;

        let region = non_empty(components.state).or_else(|| non_empty(components.province));
        let city = non_empty(components.city)
            .or_else(|| non_empty(components.town))
            .or_else(|| non_empty(components.village));

        Ok(GeoProfile {
            country: non_empty(components.country),
            country_code: non_empty(components.country_code).map(|code| code.to_uppercase()),
            city,
            region,
            lat: Some(coords.lat),
            lon: Some(coords.lon),
            method: GeoMethod::Gps,
        })
    }

    pub async fn lookup_ip(&self, ip: &str) -> Result<GeoProfile, GeoError> {
        if is_unroutable(ip) {
            return Err(GeoError::Unroutable(ip.to_string()));
        }
        let token = self
            .ipinfo_token
            .as_deref()
            .ok_or(GeoError::MissingCredentials("ipinfo token"))?;

        let response = self
            .client
            .get(format!("{}/{}/json", self.ipinfo_base_url, ip.trim()))
            .query(&[("token", token)])
            .timeout(self.ip_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status().as_u16()));
        }

        let body: IpInfoResponse = response.json().await?;
        let coords = body.loc.as_deref().and_then(parse_loc);
        let country = non_empty(body.country);

        Ok(GeoProfile {
            country_code: country.clone(),
            country,
            city: non_empty(body.city),
            region: non_empty(body.region),
            lat: coords.map(|c| c.lat),
            lon: coords.map(|c| c.lon),
            method: GeoMethod::Ip,
        })
    }
}

/// Sample cities for mock geolocation data
struct MockCity {
    city: &'static str,
    region: &'static str,
    country: &'static str,
    country_code: &'static str,
    lat: f64,
    lon: f64,
}

const MOCK_CITIES: &[MockCity] = &[
    MockCity {
        city: "New York",
        region: "New York",
        country: "United States",
        country_code: "US",
        lat: 40.7128,
        lon: -74.0060,
    },
    MockCity {
        city: "London",
        region: "England",
        country: "United Kingdom",
        country_code: "GB",
        lat: 51.5074,
        lon: -0.1278,
    },
    MockCity {
        city: "Berlin",
        region: "Berlin",
        country: "Germany",
        country_code: "DE",
        lat: 52.5200,
        lon: 13.4050,
    },
    MockCity {
        city: "São Paulo",
        region: "São Paulo",
        country: "Brazil",
        country_code: "BR",
        lat: -23.5505,
        lon: -46.6333,
    },
    MockCity {
        city: "Singapore",
        region: "Singapore",
        country: "Singapore",
        country_code: "SG",
        lat: 1.3521,
        lon: 103.8198,
    },
];

/// Canned locations for local development
pub struct MockGeoLookup;

impl MockGeoLookup {
    fn random_city(&self, method: GeoMethod) -> GeoProfile {
        match MOCK_CITIES.choose(&mut rand::thread_rng()) {
            Some(city) => GeoProfile {
                country: Some(city.country.to_string()),
                country_code: Some(city.country_code.to_string()),
                city: Some(city.city.to_string()),
                region: Some(city.region.to_string()),
                lat: Some(city.lat),
                lon: Some(city.lon),
                method,
            },
            None => GeoProfile::unresolved(),
        }
    }
}

/// Best-effort geo enrichment. Never fails: anything unresolvable comes back
/// as [`GeoProfile::unresolved`].
pub enum GeoLookupService {
    Remote(RemoteGeoLookup),
    Mock(MockGeoLookup),
}

impl GeoLookupService {
    pub fn from_settings(settings: &GeoSettings) -> Self {
        if settings.use_mock {
            info!("Using mock geo lookup service for local development");
            Self::Mock(MockGeoLookup)
        } else {
            if settings.opencage_key.is_none() {
                warn!("No OpenCage key configured, coordinate lookups will be skipped");
            }
            if settings.ipinfo_token.is_none() {
                warn!("No ipinfo token configured, IP lookups will be skipped");
            }
            Self::Remote(RemoteGeoLookup::new(settings))
        }
    }

    /// Coordinates first, then the caller's address
    pub async fn resolve_location(
        &self,
        ip: Option<&str>,
        coords: Option<Coordinates>,
    ) -> GeoProfile {
        match self {
            Self::Mock(mock) => {
                let method = if coords.is_some() {
                    GeoMethod::Gps
                } else {
                    GeoMethod::Ip
                };
                mock.random_city(method)
            }
            Self::Remote(remote) => {
                if let Some(coords) = coords {
                    match remote.reverse_geocode(coords).await {
                        Ok(profile) => return profile,
                        Err(e) => warn!("Coordinate lookup failed: {}", e),
                    }
                }

                let Some(ip) = ip else {
                    return GeoProfile::unresolved();
                };
                match remote.lookup_ip(ip).await {
                    Ok(profile) => profile,
                    Err(GeoError::Unroutable(ip)) => {
                        debug!("Skipping geo lookup for unroutable address {}", ip);
                        GeoProfile::unresolved()
                    }
                    Err(e) => {
                        warn!("IP lookup failed: {}", e);
                        GeoProfile::unresolved()
                    }
                }
            }
        }
    }

    /// Coordinates only, no address fallback
    pub async fn resolve_coordinates(&self, coords: Coordinates) -> GeoProfile {
        match self {
            Self::Mock(mock) => mock.random_city(GeoMethod::Gps),
            Self::Remote(remote) => remote.reverse_geocode(coords).await.unwrap_or_else(|e| {
                warn!("Coordinate lookup failed: {}", e);
                GeoProfile::unresolved()
            }),
        }
    }
}
