mod session_service;

pub use session_service::{SessionError, SessionService};
