mod api;
mod shutdown;

use std::sync::Arc;

use beacon_config::ServerConfig;
use clap::Args;
use tracing::{debug, info};

use api::{start_api_server, Stores};

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0:4000", env = "BEACON_ADDRESS")]
    pub address: String,

    /// MongoDB connection string
    #[arg(long, env = "BEACON_MONGODB_URI")]
    pub mongodb_uri: String,

    /// Database name, defaults to the one in the connection string
    #[arg(long = "database", env = "BEACON_DATABASE")]
    pub database_name: Option<String>,

    /// Front-end origin allowed to call the API, `*` for any
    #[arg(long, env = "BEACON_FRONTEND_ORIGIN")]
    pub frontend_origin: Option<String>,

    /// OpenCage API key for coordinate lookups
    #[arg(long, env = "BEACON_OPENCAGE_KEY", hide_env_values = true)]
    pub opencage_key: Option<String>,

    /// ipinfo token for IP lookups
    #[arg(long, env = "BEACON_IPINFO_TOKEN", hide_env_values = true)]
    pub ipinfo_token: Option<String>,

    /// Answer geo lookups from a fixed mock location
    #[arg(long, env = "BEACON_GEO_MOCK")]
    pub geo_mock: bool,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = Arc::new(
            ServerConfig::new(self.address, self.mongodb_uri)?
                .with_database_name(self.database_name)
                .with_frontend_origin(self.frontend_origin)
                .with_geo_credentials(self.opencage_key, self.ipinfo_token)
                .with_geo_mock(self.geo_mock),
        );

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async move {
            debug!("Initializing database connection...");
            let db = beacon_database::establish_connection(
                &config.mongodb_uri,
                config.database_name.as_deref(),
            )
            .await?;

            let stores = Stores::mongo(&db, config.live_feed.poll_interval);

            info!("Starting Beacon server on {}", config.address);
            start_api_server(config, stores).await
        })
    }
}
