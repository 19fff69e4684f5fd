use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use earshot_schema::BusMessage;
use futures_core::Stream;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/stream", get(event_stream))
}

async fn event_stream(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.sessions.subscribe_events(&tenant_id).await;
    tracing::debug!(%tenant_id, "event observer connected");

    let stream = async_stream::stream! {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => yield Ok(Event::default().event(event_name(&msg)).data(json)),
                Err(e) => tracing::warn!(error = %e, "failed to encode bus event"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn event_name(msg: &BusMessage) -> &'static str {
    match msg {
        BusMessage::MatchFound { .. } => "match_found",
        BusMessage::AgentTriggered { .. } => "agent_triggered",
        BusMessage::ApprovalRequested { .. } => "approval_requested",
        BusMessage::ActionExecuted { .. } => "action_executed",
        BusMessage::ActionFailed { .. } => "action_failed",
        BusMessage::PlatformFailed { .. } => "platform_failed",
        BusMessage::ListenerStopped { .. } => "listener_stopped",
    }
}
