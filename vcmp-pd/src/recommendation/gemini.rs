//! Google Gemini provider
//!
//! # API Reference
//! - Endpoint: `POST {base}/v1beta/models/{model}:generateContent?key={api_key}`
//! - Reply text: `candidates[0].content.parts[*].text`

use super::{ProviderError, RecommendationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use vcmp_common::config::ProviderConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Gemini `generateContent` client
pub struct GeminiProvider {
    http_client: Client,
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    requests_per_minute: u32,
    timeout: Duration,
}

impl GeminiProvider {
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
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            requests_per_minute: config.requests_per_minute,
            timeout,
        })
    }
}

/// Concatenated text of the first candidate
fn reply_text(response: GenerateContentResponse) -> Result<String, ProviderError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::InvalidResponse("empty candidate".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl RecommendationProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.7,
                "responseMimeType": "application/json"
            }
        });

        debug!(provider = %self.name, model = %self.model, "Requesting Gemini completion");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
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

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        reply_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcmp_common::config::ProviderKind;

    #[test]
    fn test_reply_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "{\"recommendations\"" }, { "text": ": []}" }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "{\"recommendations\": []}");
    }

    #[test]
    fn test_blocked_reply_is_invalid() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert!(matches!(
            reply_text(response),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_default_base_url() {
        let provider = GeminiProvider::new(
            &ProviderConfig {
                kind: ProviderKind::Gemini,
                name: None,
                api_key: "key".to_string(),
                model: "gemini-1.5-flash".to_string(),
                base_url: None,
                requests_per_minute: 3,
            },
            Duration::from_secs(15),
        )
        .unwrap();
        assert_eq!(provider.base_url, GEMINI_BASE_URL);
        assert_eq!(provider.name(), "gemini");
    }
}
