use crate::state::AppState;
use axum::{extract::State, Json};
use hub_protocol::{HealthResponse, PROTOCOL_VERSION};

/// `GET /health` (§6). No auth required, mirroring the teacher's
/// unauthenticated status endpoints.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        instance_id: state.instance_id.clone(),
        db_id: state.db_id.clone(),
        schema_version: state.schema_version,
        protocol_version: PROTOCOL_VERSION,
        pid: std::process::id(),
        uptime_seconds: state.uptime_seconds(),
    })
}
