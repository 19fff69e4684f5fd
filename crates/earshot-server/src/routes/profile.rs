use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use earshot_schema::{
    BusinessProfile, BusinessProfilePatch, ExampleResponse, ResponderCategory,
    ResponderPersonality, ResponseRules,
};
use serde::Deserialize;

use super::{ApiError, ApiResult};
use crate::state::AppState;

/// Fields of a responder personality a tenant may edit. Absent fields keep
/// their current value.
#[derive(Debug, Default, Deserialize)]
pub struct PersonalityBody {
    pub system_prompt: Option<String>,
    pub response_style: Option<String>,
    pub example_responses: Option<Vec<ExampleResponse>>,
    pub rules: Option<ResponseRules>,
    pub requires_context: Option<Vec<String>>,
    pub confidence_threshold: Option<u8>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route(
            "/personalities/{category}",
            get(get_personality).put(update_personality),
        )
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<BusinessProfile> {
    Ok(Json(state.sessions.context().get_profile(&tenant_id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(patch): Json<BusinessProfilePatch>,
) -> ApiResult<BusinessProfile> {
    let profile = state
        .sessions
        .context()
        .update_profile(&tenant_id, patch)
        .await?;
    Ok(Json(profile))
}

pub async fn get_personality(
    State(state): State<AppState>,
    Path((tenant_id, category)): Path<(String, String)>,
) -> ApiResult<ResponderPersonality> {
    let category = parse_category(&category)?;
    let personality = state
        .sessions
        .context()
        .get_personality(&tenant_id, category)
        .await?;
    Ok(Json(personality))
}

pub async fn update_personality(
    State(state): State<AppState>,
    Path((tenant_id, category)): Path<(String, String)>,
    Json(body): Json<PersonalityBody>,
) -> ApiResult<ResponderPersonality> {
    let category = parse_category(&category)?;
    if body.confidence_threshold.is_some_and(|t| t > 100) {
        return Err(ApiError::BadRequest(
            "confidence_threshold must be between 0 and 100".into(),
        ));
    }

    let context = state.sessions.context();
    let mut personality = context.get_personality(&tenant_id, category).await?;
    if let Some(v) = body.system_prompt {
        personality.system_prompt = v;
    }
    if let Some(v) = body.response_style {
        personality.response_style = v;
    }
    if let Some(v) = body.example_responses {
        personality.example_responses = v;
    }
    if let Some(v) = body.rules {
        personality.rules = v;
    }
    if let Some(v) = body.requires_context {
        personality.requires_context = v;
    }
    if let Some(v) = body.confidence_threshold {
        personality.confidence_threshold = v;
    }
    Ok(Json(context.save_personality(personality).await?))
}

fn parse_category(raw: &str) -> Result<ResponderCategory, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}
