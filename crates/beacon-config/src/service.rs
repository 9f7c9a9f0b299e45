use std::time::Duration;

use anyhow::bail;
use serde::Serialize;

/// Database used when the connection string does not name one
pub const DEFAULT_DATABASE_NAME: &str = "beacon";

/// Outbound geo lookup settings
#[derive(Debug, Clone, Serialize)]
pub struct GeoSettings {
    /// OpenCage API key for coordinate to place lookups
    #[serde(skip_serializing)]
    pub opencage_key: Option<String>,
    /// ipinfo token for IP to place lookups
    #[serde(skip_serializing)]
    pub ipinfo_token: Option<String>,
    /// Serve canned locations instead of calling the providers
    pub use_mock: bool,
    pub coordinate_timeout: Duration,
    pub ip_timeout: Duration,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            opencage_key: None,
            ipinfo_token: None,
            use_mock: false,
            coordinate_timeout: Duration::from_secs(6),
            ip_timeout: Duration::from_secs(5),
        }
    }
}

/// Read-side aggregation settings
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSettings {
    /// Trailing window used for the active users count
    pub active_window: Duration,
    pub recent_actions_limit: i64,
    pub top_locations_limit: i64,
    pub campaign_locations_limit: i64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            active_window: Duration::from_secs(30 * 60),
            recent_actions_limit: 50,
            top_locations_limit: 10,
            campaign_locations_limit: 20,
        }
    }
}

/// Live snapshot feed timers
#[derive(Debug, Clone, Serialize)]
pub struct LiveFeedSettings {
    /// Tick interval when the store cannot push change notifications
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for LiveFeedSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    // Required fields
    pub address: String,
    #[serde(skip_serializing)]
    pub mongodb_uri: String,

    // Optional fields
    pub database_name: Option<String>,
    /// Allowed cross-origin front-end address, `*` for any
    pub frontend_origin: String,

    pub geo: GeoSettings,
    pub analytics: AnalyticsSettings,
    pub live_feed: LiveFeedSettings,
}

impl ServerConfig {
    /// Create a new configuration with defaults for everything optional.
    ///
    /// A missing store connection string is fatal.
    pub fn new(address: String, mongodb_uri: String) -> anyhow::Result<Self> {
        if mongodb_uri.trim().is_empty() {
            bail!("MongoDB connection string is required (set BEACON_MONGODB_URI)");
        }

        Ok(ServerConfig {
            address,
            mongodb_uri: mongodb_uri.trim().to_string(),
            database_name: None,
            frontend_origin: "*".to_string(),
            geo: GeoSettings::default(),
            analytics: AnalyticsSettings::default(),
            live_feed: LiveFeedSettings::default(),
        })
    }

    pub fn with_database_name(mut self, database_name: Option<String>) -> Self {
        self.database_name = database_name.filter(|name| !name.trim().is_empty());
        self
    }

    pub fn with_frontend_origin(mut self, origin: Option<String>) -> Self {
        if let Some(origin) = origin.filter(|origin| !origin.trim().is_empty()) {
            self.frontend_origin = origin.trim().to_string();
        }
        self
    }

    pub fn with_geo_credentials(
        mut self,
        opencage_key: Option<String>,
        ipinfo_token: Option<String>,
    ) -> Self {
        self.geo.opencage_key = opencage_key.filter(|key| !key.trim().is_empty());
        self.geo.ipinfo_token = ipinfo_token.filter(|token| !token.trim().is_empty());
        self
    }

    pub fn with_geo_mock(mut self, use_mock: bool) -> Self {
        self.geo.use_mock = use_mock;
        self
    }

    /// Whether any origin may call the API
    pub fn allows_any_origin(&self) -> bool {
        self.frontend_origin == "*"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_connection_string_is_fatal() {
        assert!(ServerConfig::new("0.0.0.0:4000".into(), "".into()).is_err());
        assert!(ServerConfig::new("0.0.0.0:4000".into(), "   ".into()).is_err());
    }

    #[test]
    fn test_defaults() {
        let config =
            ServerConfig::new("0.0.0.0:4000".into(), "mongodb://localhost:27017".into()).unwrap();
        assert!(config.allows_any_origin());
        assert_eq!(config.live_feed.poll_interval, Duration::from_secs(5));
        assert_eq!(config.live_feed.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.analytics.active_window, Duration::from_secs(1800));
        assert_eq!(config.geo.coordinate_timeout, Duration::from_secs(6));
        assert_eq!(config.geo.ip_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_optional_values_are_ignored() {
        let config = ServerConfig::new("0.0.0.0:4000".into(), "mongodb://db".into())
            .unwrap()
            .with_frontend_origin(Some(" ".into()))
            .with_database_name(Some("".into()))
            .with_geo_credentials(Some("key".into()), Some("".into()));

        assert_eq!(config.frontend_origin, "*");
        assert_eq!(config.database_name, None);
        assert_eq!(config.geo.opencage_key.as_deref(), Some("key"));
        assert_eq!(config.geo.ipinfo_token, None);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let config = ServerConfig::new("0.0.0.0:4000".into(), "mongodb://user:pw@db".into())
            .unwrap()
            .with_geo_credentials(Some("secret".into()), None);
        let dump = serde_json::to_string(&config).unwrap();
        assert!(!dump.contains("pw@db"));
        assert!(!dump.contains("secret"));
    }
}
