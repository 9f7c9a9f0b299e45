//! Session and variant persistence: MongoDB stores, an in-memory twin and
//! the aggregation rows both produce.

mod connection;
mod error;
pub mod memory;
pub mod mongo;
pub mod queries;
pub mod store;

pub use connection::{establish_connection, FALLBACK_DATABASE};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use queries::*;
pub use store::{AnalyticsStore, ChangeFeed, SessionStore, StoreResult, VariantStore};

// Export test utilities for use by other crates in their tests
pub mod test_utils;
