use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use earshot_core::SessionStatus;
use earshot_schema::{ListenerConfig, ListenerConfigPatch, ListenerStats};

use super::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_listening))
        .route("/stop", post(stop_listening))
        .route("/status", get(listening_status))
        .route("/config", patch(update_config))
}

/// Starts the tenant's listener. Without a body the configured defaults apply.
pub async fn start_listening(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    config: Option<Json<ListenerConfig>>,
) -> ApiResult<SessionStatus> {
    let status = state
        .sessions
        .start(&tenant_id, config.map(|Json(c)| c))
        .await?;
    Ok(Json(status))
}

pub async fn stop_listening(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<ListenerStats> {
    Ok(Json(state.sessions.stop(&tenant_id).await?))
}

pub async fn listening_status(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<SessionStatus> {
    Json(state.sessions.status(&tenant_id).await)
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(patch): Json<ListenerConfigPatch>,
) -> ApiResult<ListenerConfig> {
    Ok(Json(state.sessions.update_config(&tenant_id, patch).await?))
}
