//! Application log retrieval endpoint.

use axum::{extract::Query, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::super::error::ApiResult;
use crate::logs;

pub fn router() -> Router {
    Router::new().route("/", get(get_logs))
}

async fn get_logs(Query(params): Query<HashMap<String, String>>) -> ApiResult<Json<Value>> {
    let lines = params
        .get("lines")
        .and_then(|l| l.parse().ok())
        .unwrap_or(100);

    let app_logs = logs::get_app_logs(lines)?;
    Ok(Json(json!({ "logs": app_logs })))
}
