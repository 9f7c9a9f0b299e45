//! Visitor session ingestion: start, action batches and geo refinement

pub mod handlers;
pub mod plugin;
pub mod services;
pub mod types;

pub use plugin::SessionsPlugin;
pub use services::*;
pub use types::*;
