//! Manual exit endpoint.

use axum::{extract::State, response::Json, routing::post, Router};
use serde_json::{json, Value};
use tracing::info;

use super::super::error::ApiResult;
use super::super::ApiState;
use crate::engine::LeaveOutcome;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/leave", post(manual_leave))
        .with_state(state)
}

/// Asks the engine to leave the current meeting.
///
/// Resolves once the leave action has been attempted. A request made while
/// an exit is already pending coalesces into it instead of issuing a
/// second leave command.
async fn manual_leave(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Manual leave requested via API");
    let outcome = state.engine.manual_leave().await?;

    Ok(Json(json!({
        "success": !matches!(outcome, LeaveOutcome::Failed),
        "outcome": outcome,
    })))
}
