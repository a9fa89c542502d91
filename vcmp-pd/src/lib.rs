//! # vcmp-pd (Program Director)
//!
//! Decides what a voice session plays:
//! - [`resolver`]: classify a user query and turn it into playable tracks
//! - [`search_gateway`]: time-bounded, concurrency-capped backend searches
//! - [`scorer`]: rank backend candidates against a canonical descriptor
//! - [`recommendation`]: AI recommendations behind circuit breakers, rate
//!   limiters and a cache
//! - [`autoplay`]: keep queues from running dry

pub mod autoplay;
pub mod backends;
pub mod catalog;
pub mod error;
pub mod recommendation;
pub mod resolver;
pub mod scorer;
pub mod search_gateway;
pub mod text;

pub use error::{ResolveError, ResolveResult};

use crate::autoplay::AutoplayManager;
use crate::backends::{AudioBackend, LavalinkBackend};
use crate::catalog::{SpotifyCatalog, TrackCatalog};
use crate::recommendation::{build_providers, ProviderGateway, RecommendationContext};
use crate::resolver::Resolver;
use crate::search_gateway::SearchGateway;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vcmp_common::config::TomlConfig;

/// Long-lived components, constructed once at startup
pub struct Engine {
    pub resolver: Arc<Resolver>,
    pub recommendations: Arc<ProviderGateway>,
    pub autoplay: Arc<AutoplayManager>,
}

impl Engine {
    /// Build every component from configuration
    pub fn from_config(config: &TomlConfig) -> ResolveResult<Self> {
        let backend: Arc<dyn AudioBackend> = Arc::new(LavalinkBackend::new(&config.lavalink)?);

        let catalog: Option<Arc<dyn TrackCatalog>> = match config.spotify_credentials() {
            Some(spotify) => Some(Arc::new(SpotifyCatalog::new(spotify)?)),
            None => {
                warn!("No Spotify credentials configured, Spotify links will not resolve");
                None
            }
        };

        let providers = build_providers(
            &config.providers,
            Duration::from_secs(config.recommendations.timeout_secs),
        )?;
        if providers.is_empty() {
            warn!("No recommendation providers configured, autoplay uses search fallbacks only");
        }

        Ok(Self::assemble(config, backend, catalog, providers))
    }

    /// Wire components around already-built clients
    pub fn assemble(
        config: &TomlConfig,
        backend: Arc<dyn AudioBackend>,
        catalog: Option<Arc<dyn TrackCatalog>>,
        providers: Vec<Arc<dyn recommendation::RecommendationProvider>>,
    ) -> Self {
        let gateway = Arc::new(SearchGateway::new(backend, &config.search));
        let resolver = Arc::new(Resolver::new(
            gateway,
            catalog,
            config.search.playlist_limit,
        ));

        let context = Arc::new(RecommendationContext::from_config(&config.recommendations));
        let provider_count = providers.len();
        let recommendations = Arc::new(ProviderGateway::new(
            providers,
            context,
            Duration::from_secs(config.recommendations.timeout_secs),
        ));

        let autoplay = Arc::new(AutoplayManager::with_entropy(
            Arc::clone(&resolver),
            Arc::clone(&recommendations),
            &config.autoplay,
            config.recommendations.count,
        ));

        info!(
            default_backend = %config.search.default_backend,
            providers = provider_count,
            "Program director ready"
        );

        Self {
            resolver,
            recommendations,
            autoplay,
        }
    }
}
