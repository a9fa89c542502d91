//! Backend Search Gateway
//!
//! Uniform, stateless front for the audio backend's search/load primitives.
//! Every call is time-bounded; failures are logged here and returned to the
//! caller, whose fallback policy decides what happens next.

use crate::backends::{AudioBackend, LoadResult};
use crate::error::{ResolveError, ResolveResult};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vcmp_common::config::SearchConfig;
use vcmp_common::{BackendKind, Candidate};

/// One search issued as part of a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub backend: BackendKind,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            query: query.into(),
            backend,
        }
    }
}

/// Search gateway over one audio backend
pub struct SearchGateway {
    backend: Arc<dyn AudioBackend>,
    default_backend: BackendKind,
    timeout: Duration,
    fanout_concurrency: usize,
}

impl SearchGateway {
    pub fn new(backend: Arc<dyn AudioBackend>, config: &SearchConfig) -> Self {
        Self {
            backend,
            default_backend: config.default_backend,
            timeout: Duration::from_secs(config.resolution_timeout_secs),
            fanout_concurrency: config.fanout_concurrency.max(1),
        }
    }

    /// Backend used for free-text and degraded searches
    pub fn default_backend(&self) -> BackendKind {
        self.default_backend
    }

    /// Search one backend (the default one when `backend` is `None`)
    pub async fn search(
        &self,
        query: &str,
        backend: Option<BackendKind>,
    ) -> ResolveResult<Vec<Candidate>> {
        let backend = backend.unwrap_or(self.default_backend);

        match tokio::time::timeout(self.timeout, self.backend.search(query, backend)).await {
            Ok(Ok(candidates)) => Ok(candidates),
            Ok(Err(e)) => {
                warn!(
                    query = %query,
                    backend = %backend,
                    error = %e,
                    "Backend search failed"
                );
                Err(e.into())
            }
            Err(_) => {
                warn!(
                    query = %query,
                    backend = %backend,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Backend search timed out"
                );
                Err(ResolveError::ResolutionTimeout(self.timeout))
            }
        }
    }

    /// Load a direct URI
    pub async fn load(&self, uri: &str) -> ResolveResult<LoadResult> {
        match tokio::time::timeout(self.timeout, self.backend.load(uri)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!(uri = %uri, error = %e, "Backend load failed");
                Err(e.into())
            }
            Err(_) => {
                warn!(uri = %uri, "Backend load timed out");
                Err(ResolveError::ResolutionTimeout(self.timeout))
            }
        }
    }

    /// Run several searches with bounded concurrency and merge the results
    ///
    /// Results keep request order and are de-duplicated by URI. Individual
    /// failures are tolerated; `AllBackendsFailed` is returned only when
    /// every request failed.
    pub async fn search_all(&self, requests: Vec<SearchRequest>) -> ResolveResult<Vec<Candidate>> {
        let attempted = requests.len();
        let label = requests
            .first()
            .map(|r| r.query.clone())
            .unwrap_or_default();

        let results: Vec<ResolveResult<Vec<Candidate>>> = stream::iter(requests)
            .map(|request| async move { self.search(&request.query, Some(request.backend)).await })
            .buffered(self.fanout_concurrency)
            .collect()
            .await;

        let mut failures = 0;
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for result in results {
            match result {
                Ok(candidates) => {
                    for candidate in candidates {
                        if seen.insert(candidate.uri.clone()) {
                            merged.push(candidate);
                        }
                    }
                }
                Err(_) => failures += 1,
            }
        }

        debug!(
            query = %label,
            attempted,
            failures,
            candidates = merged.len(),
            "Search fan-out complete"
        );

        if attempted > 0 && failures == attempted {
            return Err(ResolveError::AllBackendsFailed(label));
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that records peak concurrency and fails SoundCloud searches
    struct ProbeBackend {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl AudioBackend for ProbeBackend {
        fn name(&self) -> &str {
            "probe"
        }

        async fn search(
            &self,
            query: &str,
            backend: BackendKind,
        ) -> Result<Vec<Candidate>, BackendError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if backend == BackendKind::SoundCloud {
                return Err(BackendError::Network("down".to_string()));
            }
            Ok(vec![Candidate {
                title: query.to_string(),
                author: "a".to_string(),
                uri: format!("uri:{}", query.len() % 2),
                duration_ms: 1000,
                backend,
                thumbnail: None,
                encoded: None,
            }])
        }

        async fn load(&self, _uri: &str) -> Result<LoadResult, BackendError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(LoadResult::Empty)
        }
    }

    fn gateway() -> (SearchGateway, Arc<ProbeBackend>) {
        let backend = Arc::new(ProbeBackend {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = SearchConfig {
            resolution_timeout_secs: 1,
            fanout_concurrency: 3,
            ..SearchConfig::default()
        };
        (SearchGateway::new(backend.clone(), &config), backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fanout_concurrency_is_bounded() {
        let (gateway, backend) = gateway();
        let requests = (0..8)
            .map(|i| SearchRequest::new("q".repeat(i + 1), BackendKind::YouTube))
            .collect();

        let merged = gateway.search_all(requests).await.unwrap();

        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
        // URIs alternate between two values, so de-duplication leaves two
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_is_tolerated() {
        let (gateway, _) = gateway();
        let merged = gateway
            .search_all(vec![
                SearchRequest::new("x", BackendKind::SoundCloud),
                SearchRequest::new("y", BackendKind::YouTube),
            ])
            .await
            .unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_are_reported() {
        let (gateway, _) = gateway();
        let err = gateway
            .search_all(vec![SearchRequest::new("x", BackendKind::SoundCloud)])
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::AllBackendsFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_load_times_out() {
        let (gateway, _) = gateway();
        let err = gateway.load("https://example.com/a.mp3").await.unwrap_err();
        assert!(matches!(err, ResolveError::ResolutionTimeout(_)));
    }
}
