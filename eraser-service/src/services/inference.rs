//! Background-removal inference gateway.
//!
//! Submits a stored image's URL to the external model and returns the
//! transient result URL. The gateway never persists anything; fetching and
//! storing the result is the orchestrator's job.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference API not configured: {0}")]
    NotConfigured(String),

    #[error("Inference API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),
}

/// One external call per image. No retry, no batching; any failure surfaces
/// as a processing failure for that image.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove_background(&self, source_url: &str) -> Result<String, InferenceError>;
}

#[derive(Debug, Serialize)]
struct RemovalRequest<'a> {
    image_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemovalResponse {
    image: RemovalImage,
}

#[derive(Debug, Deserialize)]
struct RemovalImage {
    url: String,
}

/// Client for the hosted background-removal model API.
#[derive(Clone)]
pub struct RemovalClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Secret<String>,
}

impl RemovalClient {
    pub fn new(api_url: String, api_key: Secret<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && !self.api_key.expose_secret().is_empty()
    }
}

#[async_trait]
impl BackgroundRemover for RemovalClient {
    async fn remove_background(&self, source_url: &str) -> Result<String, InferenceError> {
        if !self.is_configured() {
            return Err(InferenceError::NotConfigured(
                "removal API credentials not set".to_string(),
            ));
        }

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&RemovalRequest {
                image_url: source_url,
            })
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Removal API call failed");
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RemovalResponse = serde_json::from_str(&body)
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        tracing::debug!(result_url = %parsed.image.url, "Removal API call succeeded");
        Ok(parsed.image.url)
    }
}

/// Deterministic stand-in for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct MockRemover;

#[async_trait]
impl BackgroundRemover for MockRemover {
    async fn remove_background(&self, source_url: &str) -> Result<String, InferenceError> {
        tracing::debug!(source_url = %source_url, "Mock removal invoked");
        Ok(format!("mock://processed/{}", Uuid::new_v4()))
    }
}
