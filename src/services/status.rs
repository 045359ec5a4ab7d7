use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;

use crate::models::remote::{RemoteStatus, StatusResponse};

/// Anything that can report the remote state of a transformation job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<RemoteStatus, StatusError>;
}

/// Client for the transformation API status endpoint.
pub struct StatusClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl StatusClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, StatusError> {
        let parsed =
            Url::parse(base_url).map_err(|e| StatusError::BaseUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(StatusError::BaseUrl(format!("{base_url}: not a base URL")));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StatusError::Http)?;
        Ok(Self {
            http,
            base_url: parsed,
            api_key: api_key.to_string(),
        })
    }

    /// The job id goes in as a single escaped path segment.
    fn status_url(&self, job_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(job_id);
        }
        url
    }
}

#[async_trait]
impl StatusSource for StatusClient {
    /// Single request, no retries.
    async fn fetch_status(&self, job_id: &str) -> Result<RemoteStatus, StatusError> {
        let response = self
            .http
            .get(self.status_url(job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(StatusError::Http)?
            .error_for_status()
            .map_err(StatusError::Http)?;

        let bytes = response.bytes().await.map_err(StatusError::Http)?;
        let body: StatusResponse = serde_json::from_slice(&bytes).map_err(StatusError::Decode)?;
        Ok(body.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid status base URL {0}")]
    BaseUrl(String),
}
