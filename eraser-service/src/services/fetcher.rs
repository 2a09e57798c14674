use async_trait::async_trait;
use service_core::error::AppError;
use std::collections::HashSet;

/// Fetch remote bytes (inference result URLs, zip sources).
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError>;
}

#[derive(Clone, Default)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Fetch failed for {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BadGateway(format!(
                "Fetch for {} returned {}",
                url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::BadGateway(format!("Fetch body failed for {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Serves one fixed payload for every URL; local development and tests.
#[derive(Clone, Default)]
pub struct StaticFetcher {
    payload: Vec<u8>,
    failing: HashSet<String>,
}

impl StaticFetcher {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            failing: HashSet::new(),
        }
    }

    /// Mark a URL as unreachable.
    pub fn fail_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }
}

#[async_trait]
impl UrlFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        if self.failing.contains(url) {
            return Err(AppError::BadGateway(format!("Fetch failed for {}", url)));
        }
        Ok(self.payload.clone())
    }
}
