mod handler;
mod service;
pub mod plugin;

pub use handler::{configure_routes, HealthApiDoc, HealthResponse};
pub use plugin::ConfigPlugin;
pub use service::{
    AnalyticsSettings, GeoSettings, LiveFeedSettings, ServerConfig, DEFAULT_DATABASE_NAME,
};
