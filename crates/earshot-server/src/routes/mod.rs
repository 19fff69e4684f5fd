pub mod approvals;
pub mod events;
pub mod listening;
pub mod profile;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use earshot_core::ListenError;
use serde::Serialize;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new().nest("/tenants/{tenant_id}", tenant_router())
}

fn tenant_router() -> Router<AppState> {
    Router::new()
        .nest("/listening", listening::router())
        .nest("/approvals", approvals::router())
        .nest("/events", events::router())
        .merge(profile::router())
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Listen(ListenError),
    BadRequest(String),
}

impl From<ListenError> for ApiError {
    fn from(err: ListenError) -> Self {
        ApiError::Listen(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Listen(err) => (listen_error_status(&err), err.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub fn listen_error_status(err: &ListenError) -> StatusCode {
    match err {
        ListenError::NoIntegrations { .. }
        | ListenError::AlreadyActive { .. }
        | ListenError::ApprovalAlreadyDecided(_) => StatusCode::CONFLICT,
        ListenError::NotActive { .. } | ListenError::ApprovalNotFound(_) => StatusCode::NOT_FOUND,
        ListenError::InvalidConfig(_) | ListenError::ClassificationInput(_) => {
            StatusCode::BAD_REQUEST
        }
        ListenError::AuthExpired { .. }
        | ListenError::StreamTransport { .. }
        | ListenError::Execution(_)
        | ListenError::Generation(_) => StatusCode::BAD_GATEWAY,
        ListenError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
