//! HTTP client for a running research server.

use anyhow::Context;
use std::time::Duration;

use super::client::{StreamClient, StreamError};
use crate::pipeline::{ProgressEvent, ResearchPayload, ResearchRequest};

/// Path of the streaming endpoint, relative to the base URL
pub const STREAM_PATH: &str = "/api/v1/research/stream";
/// Path of the blocking endpoint, relative to the base URL
pub const EXECUTE_PATH: &str = "/api/v1/research/execute";

/// Talks to the research endpoints of a server
#[derive(Debug, Clone)]
pub struct ResearchClient {
    base_url: String,
    http: reqwest::Client,
}

impl ResearchClient {
    /// `base_url` like `http://127.0.0.1:8000`. Only connecting is bounded
    /// by a timeout; a research run may legitimately take minutes.
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("marketlens/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stream a research run, forwarding progress to `on_progress`
    pub async fn stream_research<F>(
        &self,
        request: &ResearchRequest,
        on_progress: F,
    ) -> Result<ResearchPayload, StreamError>
    where
        F: FnMut(&ProgressEvent),
    {
        let url = format!("{}{}", self.base_url, STREAM_PATH);
        tracing::debug!(%url, "Opening research stream");

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        let response = reject_unless_success(response).await?;

        StreamClient::new(on_progress)
            .consume(response.bytes_stream())
            .await
    }

    /// Run research without progress and wait for the payload
    pub async fn execute(
        &self,
        request: &ResearchRequest,
    ) -> Result<ResearchPayload, StreamError> {
        let url = format!("{}{}", self.base_url, EXECUTE_PATH);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        let response = reject_unless_success(response).await?;

        response
            .json::<ResearchPayload>()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }
}

async fn reject_unless_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, StreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StreamError::Rejected {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull the human-readable part out of an error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(String::from))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
