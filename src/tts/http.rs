//! HTTP synthesis service client.
//!
//! Sends `{"text": "..."}` as JSON and expects the encoded audio as the
//! response body of a `200 OK`.

use crate::defaults;
use crate::error::{Result, SayflowError};
use crate::tts::Synthesizer;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
}

/// Synthesizer backed by a remote HTTP service.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    api_url: String,
}

impl HttpSynthesizer {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
        }
    }

    /// Reuse an existing client (connection pool, proxy settings).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

impl Default for HttpSynthesizer {
    fn default() -> Self {
        Self::new(defaults::API_URL)
    }
}

fn request_body(text: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(&SynthesisRequest { text: text.trim() }).map_err(|e| {
        SayflowError::Synthesis {
            message: format!("failed to encode request: {}", e),
        }
    })
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.api_url)
            .header(CONTENT_TYPE, "application/json")
            .body(request_body(text)?)
            .send()
            .await
            .map_err(|e| SayflowError::Synthesis {
                message: format!("request to {} failed: {}", self.api_url, e),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SayflowError::Synthesis {
                message: format!("service returned {}", status),
            });
        }

        let body = response.bytes().await.map_err(|e| SayflowError::Synthesis {
            message: format!("failed to read response body: {}", e),
        })?;
        Ok(body.to_vec())
    }

    fn name(&self) -> &str {
        "http"
    }
}
