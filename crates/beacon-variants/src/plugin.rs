use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use beacon_core::plugin::{
    BeaconPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use beacon_database::{AnalyticsStore, SessionStore, VariantStore};
use tracing::debug;

use crate::handlers::{self, AppState, VariantsApiDoc};
use crate::services::VariantService;

/// Split-test variants: CRUD, assignment and performance
#[derive(Default)]
pub struct VariantsPlugin;

impl VariantsPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl BeaconPlugin for VariantsPlugin {
    fn name(&self) -> &'static str {
        "variants"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let variants = context.require_service::<dyn VariantStore>()?;
            let sessions = context.require_service::<dyn SessionStore>()?;
            let analytics = context.require_service::<dyn AnalyticsStore>()?;

            let variant_service = Arc::new(VariantService::new(variants, sessions, analytics));
            context.register_service(variant_service);

            debug!("Variants plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let variant_service = context.get_service::<VariantService>()?;

        let routes = handlers::configure_routes().with_state(Arc::new(AppState { variant_service }));

        Some(PluginRoutes::new(routes))
    }

    fn openapi_schema(&self) -> Option<utoipa::openapi::OpenApi> {
        Some(<VariantsApiDoc as utoipa::OpenApi>::openapi())
    }
}
