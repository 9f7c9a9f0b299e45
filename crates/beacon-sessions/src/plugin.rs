use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use beacon_core::plugin::{
    BeaconPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use beacon_database::SessionStore;
use beacon_geo::GeoLookupService;
use tracing::debug;

use crate::handlers::{self, AppState, SessionsApiDoc};
use crate::services::SessionService;

/// Session ingestion plugin
#[derive(Default)]
pub struct SessionsPlugin;

impl SessionsPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl BeaconPlugin for SessionsPlugin {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let sessions = context.require_service::<dyn SessionStore>()?;
            let geo = context.require_service::<GeoLookupService>()?;

            context.register_service(Arc::new(SessionService::new(sessions, geo)));

            debug!("Sessions plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let session_service = context.get_service::<SessionService>()?;

        let routes = handlers::configure_routes().with_state(Arc::new(AppState { session_service }));

        Some(PluginRoutes::new(routes))
    }

    fn openapi_schema(&self) -> Option<utoipa::openapi::OpenApi> {
        Some(<SessionsApiDoc as utoipa::OpenApi>::openapi())
    }
}
