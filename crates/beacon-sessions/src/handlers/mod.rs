mod sessions_handler;

pub use sessions_handler::{configure_routes, AppState, SessionsApiDoc};
