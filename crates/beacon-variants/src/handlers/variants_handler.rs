use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, patch, post};
use axum::Router;
use beacon_core::{contract_json, ApiError, ErrorEnvelope, Issue, ValidatedJson};
use utoipa::OpenApi;

use crate::services::{AssignRequest, VariantService};
use crate::types::{
    AssignVariantRequest, AssignVariantResponse, CreateVariantRequest, DeleteVariantResponse,
    UpdateVariantRequest, VariantListResponse, VariantPerformance, VariantPerformanceResponse,
    VariantResponse, VariantView,
};

pub struct AppState {
    pub variant_service: Arc<VariantService>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_variants,
        create_variant,
        update_variant,
        delete_variant,
        assign_variant,
        variants_overview,
    ),
    components(schemas(
        CreateVariantRequest,
        UpdateVariantRequest,
        AssignVariantRequest,
        VariantView,
        VariantListResponse,
        VariantResponse,
        DeleteVariantResponse,
        AssignVariantResponse,
        VariantPerformance,
        VariantPerformanceResponse,
        ErrorEnvelope,
        Issue,
    )),
    tags(
        (name = "Variants", description = "Split-test variants and assignment")
    )
)]
pub struct VariantsApiDoc;

/// List variants, pinned first, then active, then newest
#[utoipa::path(
    get,
    path = "/variants",
    responses(
        (status = 200, description = "All variants", body = VariantListResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Variants"
)]
pub async fn list_variants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VariantListResponse>, ApiError> {
    let variants = state.variant_service.list_variants().await?;

    Ok(Json(VariantListResponse {
        ok: true,
        variants: variants.into_iter().map(VariantView::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/variants",
    request_body = CreateVariantRequest,
    responses(
        (status = 201, description = "Variant created", body = VariantResponse),
        (status = 400, description = "Invalid body", body = ErrorEnvelope),
        (status = 409, description = "Name already taken", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Variants"
)]
pub async fn create_variant(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateVariantRequest>,
) -> Result<(StatusCode, Json<VariantResponse>), ApiError> {
    let variant = state
        .variant_service
        .create_variant(request.into_new_variant())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(VariantResponse {
            ok: true,
            variant: variant.into(),
        }),
    ))
}

/// Partial update; `pinned: true` unpins every other variant
#[utoipa::path(
    patch,
    path = "/variants/{id}",
    params(
        ("id" = String, Path, description = "Variant object id (24 hex characters)")
    ),
    request_body = UpdateVariantRequest,
    responses(
        (status = 200, description = "Variant updated", body = VariantResponse),
        (status = 400, description = "Invalid id or body", body = ErrorEnvelope),
        (status = 404, description = "Variant not found", body = ErrorEnvelope),
        (status = 409, description = "Name already taken", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Variants"
)]
pub async fn update_variant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateVariantRequest>,
) -> Result<Json<VariantResponse>, ApiError> {
    let variant = state
        .variant_service
        .update_variant(&id, request.into())
        .await?;

    Ok(Json(VariantResponse {
        ok: true,
        variant: variant.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/variants/{id}",
    params(
        ("id" = String, Path, description = "Variant object id (24 hex characters)")
    ),
    responses(
        (status = 200, description = "Variant deleted", body = DeleteVariantResponse),
        (status = 400, description = "Invalid id", body = ErrorEnvelope),
        (status = 404, description = "Variant not found", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Variants"
)]
pub async fn delete_variant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteVariantResponse>, ApiError> {
    state.variant_service.delete_variant(&id).await?;
    Ok(Json(DeleteVariantResponse { ok: true }))
}

/// Choose the variant a visit should see and record it on the session
#[utoipa::path(
    post,
    path = "/variants/assign",
    request_body = AssignVariantRequest,
    responses(
        (status = 200, description = "Selected variant, or null when none is eligible", body = AssignVariantResponse),
        (status = 400, description = "Invalid body", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Variants"
)]
pub async fn assign_variant(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<AssignVariantRequest>,
) -> Result<(StatusCode, Json<AssignVariantResponse>), ApiError> {
    let chosen = state
        .variant_service
        .assign(AssignRequest {
            session_id: request.session_id.unwrap_or_default(),
            force_id: request.force_id,
            force_name: request.force_name,
        })
        .await?;

    contract_json(
        StatusCode::OK,
        AssignVariantResponse {
            ok: true,
            variant: chosen.map(VariantView::from),
        },
    )
}

/// Sessions, users, clicks and section time per assigned variant
#[utoipa::path(
    get,
    path = "/variants/analytics/overview",
    responses(
        (status = 200, description = "Variant performance", body = VariantPerformanceResponse),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Variants"
)]
pub async fn variants_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VariantPerformanceResponse>, ApiError> {
    let variants = state.variant_service.performance().await?;
    Ok(Json(VariantPerformanceResponse { ok: true, variants }))
}

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/variants", get(list_variants).post(create_variant))
        .route("/variants/assign", post(assign_variant))
        .route("/variants/analytics/overview", get(variants_overview))
        .route(
            "/variants/{id}",
            patch(update_variant).delete(delete_variant),
        )
}
