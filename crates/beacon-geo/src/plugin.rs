//! Geo plugin: registers the lookup service other plugins enrich sessions with

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use beacon_config::ServerConfig;
use beacon_core::plugin::{BeaconPlugin, PluginError, ServiceRegistrationContext};

use crate::GeoLookupService;

#[derive(Default)]
pub struct GeoPlugin;

impl GeoPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl BeaconPlugin for GeoPlugin {
    fn name(&self) -> &'static str {
        "geo"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let config = context.require_service::<ServerConfig>()?;

            let lookup = Arc::new(GeoLookupService::from_settings(&config.geo));
            context.register_service(lookup);

            tracing::debug!("Geo plugin services registered successfully");
            Ok(())
        })
    }
}
