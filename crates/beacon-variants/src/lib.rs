//! Split-test variants: CRUD, assignment and per-variant performance

pub mod handlers;
pub mod plugin;
pub mod services;
pub mod types;

pub use plugin::VariantsPlugin;
pub use services::*;
pub use types::*;
