//! Engine status endpoints.
//!
//! `GET /status` returns the derived values recomputed on each refresh
//! tick; `?style=waybar` formats them for a Waybar module. `GET /events`
//! returns the recent notification log.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::super::ApiState;
use crate::config::WaybarConfig;
use crate::engine::{EngineStatus, LifecycleState};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(engine_status))
        .route("/events", get(recent_events))
        .with_state(state)
}

async fn engine_status(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<ApiState>,
) -> Json<Value> {
    let status = state.engine.status().get().await;

    if params.get("style") == Some(&"waybar".to_string()) {
        return Json(generate_waybar_response(&status, &state.waybar));
    }

    Json(json!({
        "lifecycle": status.derived.lifecycle.as_str(),
        "current_count": status.derived.current_count,
        "maximum_count": status.derived.maximum_count,
        "over_threshold": status.derived.over_threshold,
        "activation_threshold": status.derived.activation_threshold,
        "max_count_to_exit": status.derived.max_count_to_exit,
        "pending_exit": status.pending_exit,
        "last_exit": status.last_exit,
        "updated_at": status.updated_at,
    }))
}

async fn recent_events(State(state): State<ApiState>) -> Json<Value> {
    let events = state.engine.status().recent_events().await;
    Json(json!({ "events": events }))
}

fn generate_waybar_response(status: &EngineStatus, config: &WaybarConfig) -> Value {
    let counts = format!(
        "{}/{} participants",
        status.derived.current_count, status.derived.maximum_count
    );

    let (text, class, tooltip) = match status.derived.lifecycle {
        LifecycleState::NotRunning => (
            config.not_running_text.clone(),
            "meetwarden-idle".to_string(),
            "No meeting".to_string(),
        ),
        LifecycleState::Normal => (
            config.meeting_text.clone(),
            "meetwarden-meeting".to_string(),
            counts,
        ),
        LifecycleState::Minimized => (
            config.minimized_text.clone(),
            "meetwarden-minimized".to_string(),
            counts,
        ),
        LifecycleState::UnexpectedBehavior => (
            config.unsupported_text.clone(),
            "meetwarden-error".to_string(),
            "Client unsupported".to_string(),
        ),
    };

    json!({
        "text": text,
        "class": class,
        "tooltip": tooltip
    })
}
