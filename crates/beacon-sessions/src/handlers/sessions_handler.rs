use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use beacon_core::{contract_json, ApiError, ClientInfo, ErrorEnvelope, Issue, ValidatedJson};
use beacon_entities::{DeviceType, EventKind, GeoMethod};
use utoipa::OpenApi;

use crate::services::SessionService;
use crate::types::{
    ActionInput, AppendActionsRequest, AppendActionsResponse, GeoUpdatedSession,
    StartSessionRequest, StartSessionResponse, StartedSession, UpdateGeoRequest,
    UpdateGeoResponse, UtmInput, VariantRefInput,
};

pub struct AppState {
    pub session_service: Arc<SessionService>,
}

#[derive(OpenApi)]
#[openapi(
    paths(start_session, append_actions, update_geo),
    components(schemas(
        StartSessionRequest,
        UtmInput,
        VariantRefInput,
        StartSessionResponse,
        StartedSession,
        AppendActionsRequest,
        ActionInput,
        AppendActionsResponse,
        UpdateGeoRequest,
        UpdateGeoResponse,
        GeoUpdatedSession,
        EventKind,
        DeviceType,
        GeoMethod,
        ErrorEnvelope,
        Issue,
    )),
    tags(
        (name = "Sessions", description = "Visitor session ingestion")
    )
)]
pub struct SessionsApiDoc;

/// Start or restart a visitor session
#[utoipa::path(
    post,
    path = "/sessions/start",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session stored", body = StartSessionResponse),
        (status = 400, description = "Missing or invalid fields", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Sessions"
)]
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ValidatedJson(request): ValidatedJson<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartSessionResponse>), ApiError> {
    let session = state.session_service.start_session(request, &client).await?;

    contract_json(
        StatusCode::CREATED,
        StartSessionResponse {
            ok: true,
            session: StartedSession {
                session_id: session.session_id,
                location: session.location,
                device: session.device,
            },
        },
    )
}

/// Append a batch of interaction events
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/actions",
    params(
        ("session_id" = String, Path, description = "Client session identifier")
    ),
    request_body = AppendActionsRequest,
    responses(
        (status = 200, description = "Actions appended", body = AppendActionsResponse),
        (status = 400, description = "Invalid body", body = ErrorEnvelope),
        (status = 404, description = "Unknown session", body = ErrorEnvelope),
        (status = 413, description = "Batch too large", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Sessions"
)]
pub async fn append_actions(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    ValidatedJson(request): ValidatedJson<AppendActionsRequest>,
) -> Result<(StatusCode, Json<AppendActionsResponse>), ApiError> {
    let actions = request.actions.unwrap_or_default();
    let appended = state
        .session_service
        .append_actions(&session_id, actions)
        .await?;

    contract_json(
        StatusCode::OK,
        AppendActionsResponse {
            ok: true,
            appended: appended as i64,
        },
    )
}

/// Refine a session's location from device coordinates
#[utoipa::path(
    post,
    path = "/sessions/{session_id}/geo",
    params(
        ("session_id" = String, Path, description = "Client session identifier")
    ),
    request_body = UpdateGeoRequest,
    responses(
        (status = 200, description = "Geo refreshed; session fields are null for unknown sessions", body = UpdateGeoResponse),
        (status = 400, description = "Invalid body", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    ),
    tag = "Sessions"
)]
pub async fn update_geo(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateGeoRequest>,
) -> Result<Json<UpdateGeoResponse>, ApiError> {
    let coordinates = request.coordinates()?;

    let updated = state
        .session_service
        .update_geo(&session_id, coordinates)
        .await?;

    let session = updated
        .map(|doc| GeoUpdatedSession {
            session_id: Some(doc.session_id),
            location: doc.location,
            geo_method: doc.geo_method,
        })
        .unwrap_or_default();

    Ok(Json(UpdateGeoResponse { ok: true, session }))
}

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions/start", post(start_session))
        .route("/sessions/{session_id}/actions", post(append_actions))
        .route("/sessions/{session_id}/geo", post(update_geo))
}
