//! Core utilities and types shared across all Beacon crates

pub mod client_info;
pub mod contract;
pub mod error;
pub mod plugin;
pub mod problem;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use client_info::ClientInfo;
pub use contract::{contract_json, ResponseContract};
pub use error::ErrorKind;
pub use problem::{ApiError, ErrorEnvelope, Issue};
pub use types::*;
pub use validation::{IssueCollector, Validate, ValidatedJson};

// Re-export external dependencies
pub use anyhow;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
