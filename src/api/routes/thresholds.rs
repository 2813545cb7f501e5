//! Runtime threshold replacement.

use axum::{extract::State, response::Json, routing::put, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::super::error::{ApiError, ApiResult};
use super::super::ApiState;
use crate::config::ThresholdConfig;

#[derive(Debug, Deserialize)]
pub struct ThresholdUpdate {
    pub activation_threshold: f64,
    pub max_count_to_exit: u32,
    pub debounce_ticks: u32,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/thresholds", put(update_thresholds))
        .with_state(state)
}

/// Replaces the engine's thresholds as one unit; the engine applies them
/// between ticks, so no tick ever sees a mix of old and new values.
async fn update_thresholds(
    State(state): State<ApiState>,
    Json(update): Json<ThresholdUpdate>,
) -> ApiResult<Json<Value>> {
    let thresholds = ThresholdConfig {
        activation_threshold: update.activation_threshold,
        max_count_to_exit: update.max_count_to_exit,
        debounce_ticks: update.debounce_ticks,
    };
    thresholds
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    info!(
        "Threshold update via API: activation {}, max count {}, debounce {}",
        thresholds.activation_threshold, thresholds.max_count_to_exit, thresholds.debounce_ticks
    );
    state.engine.update_thresholds(thresholds).await?;

    Ok(Json(json!({ "success": true })))
}
