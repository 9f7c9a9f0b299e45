//! Database connection management

use bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use tracing::{debug, error, info};

use crate::mongo::{SESSIONS_COLLECTION, VARIANTS_COLLECTION};
use crate::StoreError;

/// Database used when neither the caller nor the connection string names one
pub const FALLBACK_DATABASE: &str = "beacon";

/// Connect, verify the server answers and make sure indexes exist.
///
/// `database_name` wins over the default database in the connection string.
pub async fn establish_connection(
    mongodb_uri: &str,
    database_name: Option<&str>,
) -> Result<Database, StoreError> {
    let options = ClientOptions::parse(mongodb_uri).await.map_err(|e| {
        error!("Failed to parse MongoDB connection string: {}", e);
        e
    })?;
    let client = Client::with_options(options).map_err(|e| {
        error!("Failed to create MongoDB client: {}", e);
        e
    })?;

    let database = match database_name {
        Some(name) => client.database(name),
        None => client
            .default_database()
            .unwrap_or_else(|| client.database(FALLBACK_DATABASE)),
    };

    database.run_command(doc! { "ping": 1 }).await.map_err(|e| {
        error!("MongoDB did not answer ping: {}", e);
        e
    })?;
    info!("Connected to MongoDB database {}", database.name());

    ensure_indexes(&database).await?;
    Ok(database)
}

async fn ensure_indexes(database: &Database) -> Result<(), StoreError> {
    let unique = || IndexOptions::builder().unique(true).build();

    let sessions = database.collection::<bson::Document>(SESSIONS_COLLECTION);
    sessions
        .create_index(
            IndexModel::builder()
                .keys(doc! { "sessionId": 1 })
                .options(unique())
                .build(),
        )
        .await?;
    sessions
        .create_index(IndexModel::builder().keys(doc! { "updatedAt": -1 }).build())
        .await?;

    let variants = database.collection::<bson::Document>(VARIANTS_COLLECTION);
    variants
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(unique())
                .build(),
        )
        .await?;
    variants
        .create_index(
            IndexModel::builder()
                .keys(doc! { "pinned": -1, "active": -1, "createdAt": -1 })
                .build(),
        )
        .await?;

    debug!("MongoDB indexes ensured");
    Ok(())
}
