//! Recommendation Provider Gateway
//!
//! Asks providers in a fixed preference order and returns the first valid
//! answer. Providers with an open circuit or an active backoff are skipped
//! without a network call. Validated results are cached; a cache hit
//! bypasses the providers entirely.
//!
//! Health and cache state live in a [`RecommendationContext`] that is
//! constructed once and shared by every session.

use super::cache::{cache_key, RecommendationCache};
use super::health::{Admission, HealthPolicy, ProviderHealth, ProviderHealthSnapshot};
use super::prompt::{build_prompt, parse_recommendations};
use super::{ProviderError, RecommendationDescriptor, RecommendationOptions, RecommendationProvider};
use crate::error::{ResolveError, ResolveResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vcmp_common::config::RecommendationConfig;
use vcmp_common::CanonicalTrackDescriptor;

/// Process-wide provider health and recommendation cache
///
/// Health is keyed by the provider's slot in preference order, so two
/// providers sharing a display name still get separate breakers and budgets.
/// Locks are never held across an await point.
pub struct RecommendationContext {
    policy: HealthPolicy,
    health: Mutex<HashMap<usize, ProviderHealth>>,
    cache: Mutex<RecommendationCache>,
}

impl RecommendationContext {
    pub fn new(policy: HealthPolicy, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            policy,
            health: Mutex::new(HashMap::new()),
            cache: Mutex::new(RecommendationCache::new(cache_capacity, cache_ttl)),
        }
    }

    pub fn from_config(config: &RecommendationConfig) -> Self {
        let policy = HealthPolicy {
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
            ..HealthPolicy::default()
        };
        Self::new(
            policy,
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    fn health_map(&self) -> MutexGuard<'_, HashMap<usize, ProviderHealth>> {
        // A panic elsewhere must not wedge every session
        self.health.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cache(&self) -> MutexGuard<'_, RecommendationCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` on the health entry of the provider in `slot`, creating it on
    /// first use
    fn with_health<T>(
        &self,
        slot: usize,
        provider: &dyn RecommendationProvider,
        f: impl FnOnce(&mut ProviderHealth) -> T,
    ) -> T {
        let mut map = self.health_map();
        let entry = map
            .entry(slot)
            .or_insert_with(|| ProviderHealth::new(provider.requests_per_minute(), self.policy));
        f(entry)
    }

    pub fn cached(&self, key: &str) -> Option<Vec<RecommendationDescriptor>> {
        self.cache().get(key, Instant::now())
    }

    pub fn store(&self, key: String, recommendations: Vec<RecommendationDescriptor>) {
        self.cache().put(key, recommendations, Instant::now());
    }
}

/// Gateway over the configured providers
pub struct ProviderGateway {
    providers: Vec<Arc<dyn RecommendationProvider>>,
    context: Arc<RecommendationContext>,
    timeout: Duration,
}

impl ProviderGateway {
    pub fn new(
        providers: Vec<Arc<dyn RecommendationProvider>>,
        context: Arc<RecommendationContext>,
        timeout: Duration,
    ) -> Self {
        Self {
            providers,
            context,
            timeout,
        }
    }

    pub fn context(&self) -> &Arc<RecommendationContext> {
        &self.context
    }

    /// Recommendations for `seed`, or an empty list when every provider is
    /// unavailable
    pub async fn get_recommendations(
        &self,
        seed: &CanonicalTrackDescriptor,
        history: &[CanonicalTrackDescriptor],
        options: RecommendationOptions,
    ) -> Vec<RecommendationDescriptor> {
        match self.try_get_recommendations(seed, history, options).await {
            Ok(recommendations) => recommendations,
            Err(e) => {
                debug!(error = %e, "No recommendations available");
                Vec::new()
            }
        }
    }

    /// Like [`get_recommendations`](Self::get_recommendations) but reports
    /// exhaustion as [`ResolveError::ProvidersExhausted`]
    pub async fn try_get_recommendations(
        &self,
        seed: &CanonicalTrackDescriptor,
        history: &[CanonicalTrackDescriptor],
        options: RecommendationOptions,
    ) -> ResolveResult<Vec<RecommendationDescriptor>> {
        let key = cache_key(seed, history, &options);
        if let Some(cached) = self.context.cached(&key) {
            debug!(
                artist = %seed.artist,
                title = %seed.title,
                count = cached.len(),
                "Recommendation cache hit"
            );
            return Ok(cached);
        }

        let prompt = build_prompt(seed, history, options.count);

        for (slot, provider) in self.providers.iter().enumerate() {
            let name = provider.name();

            let admission = self
                .context
                .with_health(slot, provider.as_ref(), |h| h.admit(Instant::now()));
            match admission {
                Admission::Allowed => {}
                Admission::CircuitOpen { .. } => {
                    debug!(
                        provider = %name,
                        reason = %ResolveError::ProviderCircuitOpen(name.to_string()),
                        "Skipping provider"
                    );
                    continue;
                }
                Admission::BackoffActive { until } | Admission::BudgetExhausted { until } => {
                    debug!(
                        provider = %name,
                        reason = %ResolveError::ProviderRateLimited(name.to_string()),
                        retry_in_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "Skipping provider"
                    );
                    continue;
                }
            }

            let outcome = match tokio::time::timeout(self.timeout, provider.complete(&prompt)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };

            match outcome.and_then(|text| parse_recommendations(&text, options.count)) {
                Ok(recommendations) => {
                    self.context.with_health(slot, provider.as_ref(), |h| h.record_success());
                    self.context.store(key, recommendations.clone());
                    info!(
                        provider = %name,
                        artist = %seed.artist,
                        title = %seed.title,
                        count = recommendations.len(),
                        "Received recommendations"
                    );
                    return Ok(recommendations);
                }
                Err(ProviderError::RateLimited(message)) => {
                    self.context.with_health(slot, provider.as_ref(), |h| {
                        h.record_rate_limited(Instant::now())
                    });
                    warn!(provider = %name, message = %message, "Provider rate limited");
                }
                Err(e) => {
                    let error = classify_failure(name, e);
                    let opened = self.context.with_health(slot, provider.as_ref(), |h| {
                        h.record_failure(Instant::now())
                    });
                    warn!(provider = %name, error = %error, "Provider request failed");
                    if opened {
                        warn!(provider = %name, "Provider circuit opened");
                    }
                }
            }
        }

        warn!(
            providers = self.providers.len(),
            artist = %seed.artist,
            title = %seed.title,
            "All recommendation providers exhausted"
        );
        Err(ResolveError::ProvidersExhausted {
            attempted: self.providers.len(),
        })
    }

    /// Health of every configured provider, in preference order
    pub fn health_snapshot(&self) -> Vec<ProviderHealthSnapshot> {
        self.providers
            .iter()
            .enumerate()
            .map(|(slot, provider)| {
                self.context.with_health(slot, provider.as_ref(), |h| {
                    h.snapshot(provider.name(), Instant::now())
                })
            })
            .collect()
    }
}

fn classify_failure(provider: &str, error: ProviderError) -> ResolveError {
    match error {
        ProviderError::InvalidResponse(reason) => ResolveError::InvalidProviderResponse {
            provider: provider.to_string(),
            reason,
        },
        ProviderError::Timeout(after) => ResolveError::ResolutionTimeout(after),
        other => ResolveError::Provider(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl RecommendationProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn requests_per_minute(&self) -> u32 {
            10
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.reply.to_string())
        }
    }

    fn context() -> Arc<RecommendationContext> {
        Arc::new(RecommendationContext::new(
            HealthPolicy::default(),
            10,
            Duration::from_secs(1800),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_reply_counts_as_failure_and_next_provider_answers() {
        let gateway = ProviderGateway::new(
            vec![
                Arc::new(Fixed {
                    name: "broken",
                    reply: "sorry",
                }),
                Arc::new(Fixed {
                    name: "good",
                    reply: r#"{"recommendations":[{"title":"Roads","artist":"Portishead"}]}"#,
                }),
            ],
            context(),
            Duration::from_secs(15),
        );

        let recs = gateway
            .get_recommendations(
                &CanonicalTrackDescriptor::new("Massive Attack", "Teardrop"),
                &[],
                RecommendationOptions::default(),
            )
            .await;
        assert_eq!(recs.len(), 1);

        let snapshot = gateway.health_snapshot();
        assert_eq!(snapshot[0].name, "broken");
        assert_eq!(snapshot[0].consecutive_failures, 1);
        assert_eq!(snapshot[1].consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_providers_yields_empty_list() {
        let gateway = ProviderGateway::new(Vec::new(), context(), Duration::from_secs(15));
        let seed = CanonicalTrackDescriptor::new("A", "B");

        assert!(gateway
            .get_recommendations(&seed, &[], RecommendationOptions::default())
            .await
            .is_empty());
        assert!(matches!(
            gateway
                .try_get_recommendations(&seed, &[], RecommendationOptions::default())
                .await,
            Err(ResolveError::ProvidersExhausted { attempted: 0 })
        ));
    }

    #[test]
    fn test_failure_classification() {
        assert!(matches!(
            classify_failure("p", ProviderError::InvalidResponse("x".to_string())),
            ResolveError::InvalidProviderResponse { .. }
        ));
        assert!(matches!(
            classify_failure("p", ProviderError::Timeout(Duration::from_secs(15))),
            ResolveError::ResolutionTimeout(_)
        ));
        assert!(matches!(
            classify_failure("p", ProviderError::Api(500, String::new())),
            ResolveError::Provider(_)
        ));
    }
}
