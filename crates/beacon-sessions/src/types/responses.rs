use beacon_core::ResponseContract;
use beacon_entities::{DeviceType, GeoMethod};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: String,
    #[schema(example = "Berlin, Germany")]
    pub location: Option<String>,
    pub device: Option<DeviceType>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "ok": true,
    "session": {"sessionId": "3f0b2c4e-6a1d", "location": "Berlin, Germany", "device": "desktop"}
}))]
pub struct StartSessionResponse {
    pub ok: bool,
    pub session: StartedSession,
}

impl ResponseContract for StartSessionResponse {
    fn check(&self) -> Result<(), String> {
        if !self.ok {
            return Err("ok must be true".into());
        }
        if self.session.session_id.is_empty() {
            return Err("session.sessionId must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppendActionsResponse {
    pub ok: bool,
    #[schema(example = 3)]
    pub appended: i64,
}

impl ResponseContract for AppendActionsResponse {
    fn check(&self) -> Result<(), String> {
        if !self.ok {
            return Err("ok must be true".into());
        }
        if self.appended < 0 {
            return Err(format!("appended must be non-negative, got {}", self.appended));
        }
        Ok(())
    }
}

/// Fields are null when no session matched the identifier
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeoUpdatedSession {
    pub session_id: Option<String>,
    pub location: Option<String>,
    pub geo_method: Option<GeoMethod>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpdateGeoResponse {
    pub ok: bool,
    pub session: GeoUpdatedSession,
}
