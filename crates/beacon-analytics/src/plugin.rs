use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use beacon_config::ServerConfig;
use beacon_core::plugin::{
    BeaconPlugin, PluginContext, PluginError, PluginRoutes, ServiceRegistrationContext,
};
use beacon_database::{AnalyticsStore, ChangeFeed};
use tracing::debug;

use crate::handlers::{self, AnalyticsApiDoc, AppState};
use crate::services::{AnalyticsService, LiveFeedService};

/// Dashboard aggregates and the live overview stream
#[derive(Default)]
pub struct AnalyticsPlugin;

impl AnalyticsPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl BeaconPlugin for AnalyticsPlugin {
    fn name(&self) -> &'static str {
        "analytics"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let store = context.require_service::<dyn AnalyticsStore>()?;
            let changes = context.require_service::<dyn ChangeFeed>()?;
            let config = context.require_service::<ServerConfig>()?;

            let analytics_service = Arc::new(AnalyticsService::new(store, config.analytics.clone()));
            let live_feed = Arc::new(LiveFeedService::new(
                analytics_service.clone(),
                changes,
                config.live_feed.heartbeat_interval,
            ));

            context.register_service(analytics_service);
            context.register_service(live_feed);

            debug!("Analytics plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let analytics_service = context.get_service::<AnalyticsService>()?;
        let live_feed = context.get_service::<LiveFeedService>()?;

        let routes = handlers::configure_routes().with_state(Arc::new(AppState {
            analytics_service,
            live_feed,
        }));

        Some(PluginRoutes::new(routes))
    }

    fn openapi_schema(&self) -> Option<utoipa::openapi::OpenApi> {
        Some(<AnalyticsApiDoc as utoipa::OpenApi>::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_database::MemoryStore;

    fn context_with(store: Arc<MemoryStore>, with_config: bool) -> ServiceRegistrationContext {
        let context = ServiceRegistrationContext::new();
        let analytics: Arc<dyn AnalyticsStore> = store.clone();
        let changes: Arc<dyn ChangeFeed> = store;
        context.register_service(analytics);
        context.register_service(changes);
        if with_config {
            let config = ServerConfig::new("127.0.0.1:4000".into(), "mongodb://db".into()).unwrap();
            context.register_service(Arc::new(config));
        }
        context
    }

    #[tokio::test]
    async fn test_requires_server_config() {
        let context = context_with(Arc::new(MemoryStore::new()), false);

        assert!(AnalyticsPlugin::new().register_services(&context).await.is_err());
    }

    #[tokio::test]
    async fn test_registers_services_and_routes() {
        let context = context_with(Arc::new(MemoryStore::new()), true);
        let plugin = AnalyticsPlugin::new();

        plugin.register_services(&context).await.unwrap();

        assert!(context.get_service::<AnalyticsService>().is_some());
        assert!(context.get_service::<LiveFeedService>().is_some());
        assert!(plugin
            .configure_routes(&context.create_plugin_context())
            .is_some());

        let openapi = plugin.openapi_schema().unwrap();
        assert!(openapi.paths.paths.contains_key("/analytics/stream"));
        assert!(openapi.paths.paths.contains_key("/analytics/campaigns/detail"));
    }
}
