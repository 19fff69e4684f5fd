use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use earshot_core::DecisionOutcome;
use earshot_schema::{ApprovalDecision, ApprovalRequest};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub edited_text: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pending))
        .route("/{approval_id}/decision", post(decide))
}

pub async fn list_pending(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Vec<ApprovalRequest>> {
    Ok(Json(state.sessions.pending_approvals(&tenant_id).await?))
}

pub async fn decide(
    State(state): State<AppState>,
    Path((tenant_id, approval_id)): Path<(String, Uuid)>,
    Json(body): Json<DecisionBody>,
) -> ApiResult<DecisionOutcome> {
    let outcome = state
        .sessions
        .decide(&tenant_id, approval_id, body.decision, body.edited_text)
        .await?;
    Ok(Json(outcome))
}
