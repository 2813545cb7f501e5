//! HTTP client for the local meetwarden service.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::API_PORT;

/// Client for the local control API.
pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
}

/// Response from `GET /status`.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub lifecycle: String,
    pub current_count: u32,
    pub maximum_count: u32,
    pub over_threshold: bool,
    pub activation_threshold: f64,
    pub max_count_to_exit: u32,
    pub pending_exit: Option<String>,
    pub last_exit: Option<String>,
}

/// Response from `POST /leave`.
#[derive(Debug, Deserialize)]
pub struct LeaveResponse {
    pub success: bool,
    pub outcome: String,
}

impl ServiceClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{API_PORT}"),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get_json("/status").await
    }

    pub async fn status_raw(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .context("Is the meetwarden service running?")?;
        Ok(response.text().await?)
    }

    pub async fn leave(&self) -> Result<LeaveResponse> {
        let response = self
            .client
            .post(format!("{}/leave", self.base_url))
            .send()
            .await
            .context("Is the meetwarden service running?")?;
        Ok(response.json().await.context("Malformed leave response")?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .context("Is the meetwarden service running?")?;
        Ok(response
            .json()
            .await
            .with_context(|| format!("Malformed response from {path}"))?)
    }
}

impl Default for ServiceClient {
    fn default() -> Self {
        Self::new()
    }
}
