//! Test utilities for MongoDB integration tests
//!
//! Starts a throwaway `mongo` container per test database. Tests using it
//! need a Docker daemon and are marked `#[ignore]`.

use std::time::Duration;

use mongodb::Database;
use testcontainers::{runners::AsyncRunner, ContainerAsync, GenericImage};

use crate::{establish_connection, MongoStore};

pub struct TestDatabase {
    pub database: Database,
    pub mongodb_uri: String,
    #[allow(dead_code)]
    container: ContainerAsync<GenericImage>,
}

impl TestDatabase {
    pub async fn new() -> anyhow::Result<Self> {
        let container = GenericImage::new("mongo", "7").start().await?;
        let port = container.get_host_port_ipv4(27017).await?;
        let mongodb_uri = format!("mongodb://127.0.0.1:{}", port);

        let mut retries = 10;
        let database = loop {
            match establish_connection(&mongodb_uri, Some("beacon_test")).await {
                Ok(database) => break database,
                Err(e) if retries > 0 => {
                    retries -= 1;
                    tracing::debug!("MongoDB not ready yet: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(anyhow::anyhow!("Failed to connect to MongoDB: {}", e)),
            }
        };

        Ok(Self {
            database,
            mongodb_uri,
            container,
        })
    }

    pub fn store(&self) -> MongoStore {
        MongoStore::new(&self.database, Duration::from_millis(200))
    }
}
