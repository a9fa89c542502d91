//! Error types for vcmp-pd
//!
//! Failures inside a single backend or provider attempt are logged where they
//! happen and turned into "try next" signals; only configuration problems are
//! meant to reach the top of the process.

use crate::backends::BackendError;
use crate::catalog::CatalogError;
use crate::recommendation::ProviderError;
use thiserror::Error;

/// Resolution / recommendation error taxonomy
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every backend answered but none returned a usable candidate
    #[error("No candidates found for '{0}'")]
    NoCandidatesFound(String),

    /// Every backend queried for this request failed
    #[error("All backends failed for '{0}'")]
    AllBackendsFailed(String),

    /// Provider request budget exhausted or provider answered 429
    #[error("Provider '{0}' is rate limited")]
    ProviderRateLimited(String),

    /// Provider skipped because its circuit breaker is open
    #[error("Provider '{0}' circuit is open")]
    ProviderCircuitOpen(String),

    /// Provider reply did not parse into a usable recommendation list
    #[error("Provider '{provider}' returned an invalid response: {reason}")]
    InvalidProviderResponse { provider: String, reason: String },

    /// A backend or provider call exceeded its time bound
    #[error("Timed out after {0:?}")]
    ResolutionTimeout(std::time::Duration),

    /// All recommendation providers were skipped or failed
    #[error("All {attempted} recommendation providers exhausted")]
    ProvidersExhausted { attempted: usize },

    /// Audio backend error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Streaming catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Provider transport error
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Malformed configuration
    #[error("Configuration error: {0}")]
    Config(#[from] vcmp_common::Error),
}

/// Result type for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;
