//! Dashboard aggregates over the session collection and the live overview feed

pub mod handlers;
pub mod plugin;
pub mod services;
pub mod types;

pub use plugin::AnalyticsPlugin;
pub use services::*;
pub use types::*;
