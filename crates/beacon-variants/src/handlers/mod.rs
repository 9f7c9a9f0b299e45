mod variants_handler;

pub use variants_handler::{configure_routes, AppState, VariantsApiDoc};
