//! Config plugin: shares the startup configuration with every other plugin
//! and serves the health check.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use beacon_core::plugin::{
    BeaconPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use utoipa::{openapi::OpenApi, OpenApi as OpenApiTrait};

use crate::{configure_routes, HealthApiDoc, ServerConfig};

pub struct ConfigPlugin {
    server_config: Arc<ServerConfig>,
}

impl ConfigPlugin {
    pub fn new(server_config: Arc<ServerConfig>) -> Self {
        Self { server_config }
    }
}

impl BeaconPlugin for ConfigPlugin {
    fn name(&self) -> &'static str {
        "config"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            context.register_service(self.server_config.clone());

            tracing::debug!("Config plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, _context: &PluginContext) -> Option<PluginRoutes> {
        Some(PluginRoutes::new(configure_routes()))
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        Some(HealthApiDoc::openapi())
    }
}
