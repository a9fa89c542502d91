//! OpenAI-compatible chat completions provider
//!
//! Works against OpenAI itself and hosts exposing the same API (Groq,
//! OpenRouter, local servers) through `base_url`.
//!
//! # API Reference
//! - Endpoint: `POST {base}/chat/completions`
//! - Auth: `Authorization: Bearer {api_key}`
//! - Reply text: `choices[0].message.content`

use super::{ProviderError, RecommendationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use vcmp_common::config::ProviderConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_MESSAGE: &str = "You recommend music and answer only with JSON.";

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Chat completions client
pub struct OpenAiProvider {
    http_client: Client,
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    requests_per_minute: u32,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            name: config.display_name(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            requests_per_minute: config.requests_per_minute,
            timeout,
        })
    }
}

fn reply_text(response: ChatCompletionResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse("empty completion".to_string()))
}

#[async_trait]
impl RecommendationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_MESSAGE },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.7,
            "response_format": { "type": "json_object" }
        });

        debug!(provider = %self.name, model = %self.model, "Requesting chat completion");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        reply_text(parsed)
    }
}
