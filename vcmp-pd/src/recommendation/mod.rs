//! AI recommendation providers and the resilient gateway in front of them
//!
//! Providers only transport a prompt and return raw text. Prompt building,
//! response extraction and validation live in [`prompt`]; per-provider
//! circuit breaking and rate limiting live in [`health`]; the shared
//! in-memory result cache lives in [`cache`].

pub mod cache;
pub mod gateway;
pub mod gemini;
pub mod health;
pub mod openai;
pub mod prompt;

pub use cache::RecommendationCache;
pub use gateway::{ProviderGateway, RecommendationContext};
pub use gemini::GeminiProvider;
pub use health::{Admission, HealthPolicy, ProviderHealth, ProviderHealthSnapshot};
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vcmp_common::config::{ProviderConfig, ProviderKind};
use vcmp_common::CanonicalTrackDescriptor;

/// AI provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429 or an equivalent quota signal
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider API error {0}: {1}")]
    Api(u16, String),

    /// Transport succeeded but the reply held no usable recommendations
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// One recommended song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationDescriptor {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Provider's own similarity estimate, 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl RecommendationDescriptor {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            reason: None,
            similarity: None,
        }
    }

    /// Canonical descriptor used to resolve the recommendation
    pub fn to_canonical(&self) -> CanonicalTrackDescriptor {
        CanonicalTrackDescriptor::new(self.artist.clone(), self.title.clone())
    }
}

/// Request options that affect the provider reply (and the cache key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecommendationOptions {
    pub count: usize,
}

impl Default for RecommendationOptions {
    fn default() -> Self {
        Self { count: 5 }
    }
}

/// Transport to one AI model
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// Name used in logs, health state and snapshots
    fn name(&self) -> &str;

    /// Request budget per 60 second window
    fn requests_per_minute(&self) -> u32;

    /// Send the prompt, return the model's raw text
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Build providers from configuration, keeping file order as preference order
pub fn build_providers(
    configs: &[ProviderConfig],
    timeout: Duration,
) -> Result<Vec<Arc<dyn RecommendationProvider>>, ProviderError> {
    configs
        .iter()
        .map(|config| -> Result<Arc<dyn RecommendationProvider>, ProviderError> {
            Ok(match config.kind {
                ProviderKind::Gemini => Arc::new(GeminiProvider::new(config, timeout)?),
                ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config, timeout)?),
            })
        })
        .collect()
}
