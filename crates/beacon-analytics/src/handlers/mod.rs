mod analytics_handler;

pub use analytics_handler::{configure_routes, AnalyticsApiDoc, AppState};
