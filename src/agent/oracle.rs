//! Reasoning oracle interface and the HTTPS Messages API backend

use crate::agent::client::CliOracle;
use crate::config::{OracleBackend, OracleConfig};
use crate::error::{HealError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Black-box request/response reasoning service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one user prompt, return the free-text answer
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the configured oracle backend
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>> {
    Ok(match config.backend {
        OracleBackend::Api => Arc::new(ApiOracle::new(config.clone())?),
        OracleBackend::Cli => Arc::new(CliOracle::new(config.clone())),
    })
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<OracleMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Oracle reached over the Messages HTTP API
pub struct ApiOracle {
    config: OracleConfig,
    http: Client,
}

impl ApiOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| HealError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

#[async_trait]
impl Oracle for ApiOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(HealError::Oracle("API key not configured".to_string()));
        }

        debug!("Sending request to oracle ({})", self.config.model);

        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![OracleMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Oracle API error: {} - {}", status, body);
            return Err(HealError::Oracle(format!("API error: {} - {}", status, body)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| HealError::Oracle(format!("Failed to parse API response: {}", e)))?;

        let text = first_text(&parsed)
            .ok_or_else(|| HealError::Oracle("Response contained no text block".to_string()))?;

        debug!("Oracle response received: {} chars", text.len());
        Ok(text)
    }
}

fn first_text(response: &MessagesResponse) -> Option<String> {
    response
        .content
        .iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text.clone())
}
