use axum::{routing::get, Json, Router};
use beacon_core::{iso_millis, UtcDateTime};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    paths(health),
    components(schemas(HealthResponse)),
    tags(
        (name = "Health", description = "Liveness check")
    )
)]
pub struct HealthApiDoc;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    #[schema(example = "backend")]
    pub service: String,
    #[serde(serialize_with = "iso_millis::serialize")]
    #[schema(value_type = String, format = DateTime)]
    pub time: UtcDateTime,
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: "backend".to_string(),
        time: chrono::Utc::now(),
    })
}

pub fn configure_routes() -> Router {
    Router::new().route("/health", get(health))
}
