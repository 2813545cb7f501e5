//! REST API server for meetwarden.
//!
//! Provides HTTP endpoints for:
//! - Engine status and the recent notification log
//! - Manual meeting exit
//! - Runtime threshold replacement
//! - Application logs

pub mod error;
pub mod routes;

use crate::config::{Config, WaybarConfig};
use crate::engine::EngineHandle;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub const API_PORT: u16 = 3948; // EXIT on a phone keypad

#[derive(Clone)]
pub struct ApiState {
    pub engine: EngineHandle,
    pub waybar: WaybarConfig,
}

pub struct ApiServer {
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(engine: EngineHandle, config: &Config) -> Self {
        Self {
            port: API_PORT,
            state: ApiState {
                engine,
                waybar: config.ui.waybar.clone(),
            },
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .merge(routes::status::router(self.state.clone()))
            .merge(routes::leave::router(self.state.clone()))
            .merge(routes::thresholds::router(self.state.clone()))
            .nest("/logs", routes::logs::router())
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                    - Service info");
        info!("  GET  /version             - Version info");
        info!("  GET  /status              - Engine status (add ?style=waybar)");
        info!("  GET  /events              - Recent engine notifications");
        info!("  POST /leave               - Leave the current meeting");
        info!("  PUT  /thresholds          - Replace exit thresholds");
        info!("  GET  /logs                - Application logs");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "meetwarden",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "meetwarden"
    }))
}
