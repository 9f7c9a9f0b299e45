use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use beacon_analytics::AnalyticsPlugin;
use beacon_config::{ConfigPlugin, ServerConfig};
use beacon_core::plugin::PluginManager;
use beacon_core::problem::panic_response;
use beacon_database::{AnalyticsStore, ChangeFeed, MongoStore, SessionStore, VariantStore};
use beacon_geo::GeoPlugin;
use beacon_sessions::SessionsPlugin;
use beacon_variants::VariantsPlugin;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use mongodb::Database;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use utoipa_swagger_ui::SwaggerUi;

use super::shutdown::shutdown_signal;

/// How long open connections (live feeds included) may linger after a
/// shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The store trait objects every plugin resolves from the service registry
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub analytics: Arc<dyn AnalyticsStore>,
    pub variants: Arc<dyn VariantStore>,
    pub changes: Arc<dyn ChangeFeed>,
}

impl Stores {
    pub fn mongo(db: &Database, poll_interval: Duration) -> Self {
        Self::from_store(Arc::new(MongoStore::new(db, poll_interval)))
    }

    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: SessionStore + AnalyticsStore + VariantStore + ChangeFeed + 'static,
    {
        Self {
            sessions: store.clone(),
            analytics: store.clone(),
            variants: store.clone(),
            changes: store,
        }
    }
}

fn create_swagger_router(plugin_manager: &PluginManager) -> anyhow::Result<Router> {
    let api_doc = plugin_manager
        .get_unified_openapi()
        .map_err(|e| anyhow::anyhow!("Failed to build unified OpenAPI schema: {}", e))?;
    Ok(Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc)))
}

fn cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origin = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let origin = HeaderValue::from_str(&config.frontend_origin).map_err(|e| {
            anyhow::anyhow!("Invalid front-end origin '{}': {}", config.frontend_origin, e)
        })?;
        AllowOrigin::exact(origin)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE]))
}

/// Register every plugin against the given stores and assemble the router
pub async fn build_application(
    config: Arc<ServerConfig>,
    stores: Stores,
) -> anyhow::Result<Router> {
    let mut plugin_manager = PluginManager::new();

    // Core services plugins resolve by trait
    let service_context = plugin_manager.service_context();
    service_context.register_service(stores.sessions);
    service_context.register_service(stores.analytics);
    service_context.register_service(stores.variants);
    service_context.register_service(stores.changes);

    // Registration order follows service dependencies
    debug!("Registering ConfigPlugin");
    plugin_manager.register_plugin(Box::new(ConfigPlugin::new(config.clone())));
    debug!("Registering GeoPlugin");
    plugin_manager.register_plugin(Box::new(GeoPlugin::new()));
    debug!("Registering SessionsPlugin");
    plugin_manager.register_plugin(Box::new(SessionsPlugin::new()));
    debug!("Registering VariantsPlugin");
    plugin_manager.register_plugin(Box::new(VariantsPlugin::new()));
    debug!("Registering AnalyticsPlugin");
    plugin_manager.register_plugin(Box::new(AnalyticsPlugin::new()));

    plugin_manager
        .initialize_plugins()
        .await
        .map_err(|e| anyhow::anyhow!("Plugin initialization failed: {}", e))?;
    debug!("All plugins initialized successfully");

    let app = plugin_manager
        .build_application()
        .merge(create_swagger_router(&plugin_manager)?)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

pub async fn start_api_server(config: Arc<ServerConfig>, stores: Stores) -> anyhow::Result<()> {
    let app = build_application(config.clone(), stores).await?;

    let listener = TcpListener::bind(&config.address).await?;
    info!("Beacon API listening on {}", config.address);

    let shutdown = CancellationToken::new();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let forced = async {
        shutdown_signal().await;
        shutdown.cancel();
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        result = server.into_future() => result?,
        _ = forced => warn!(
            "Connections still open after {:?}, forcing shutdown",
            SHUTDOWN_GRACE
        ),
    }

    info!("Beacon API server exited");
    Ok(())
}
