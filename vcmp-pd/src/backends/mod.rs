//! Audio backend clients
//!
//! An audio backend is the server that can both search an index (YouTube,
//! SoundCloud) and produce playable handles for the voice transport.

pub mod lavalink;

pub use lavalink::LavalinkBackend;

use async_trait::async_trait;
use thiserror::Error;
use vcmp_common::{BackendKind, Candidate};

/// Audio backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// The backend itself reported the load as failed
    #[error("Load failed ({severity}): {message}")]
    LoadFailed { severity: String, message: String },

    #[error("Backend {0} cannot be searched")]
    Unsearchable(BackendKind),
}

/// Outcome of loading a direct URI
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Track(Candidate),
    Playlist { name: String, tracks: Vec<Candidate> },
    Empty,
}

/// Search and load primitives of one audio server
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Free-text search on one indexed backend
    async fn search(&self, query: &str, backend: BackendKind)
        -> Result<Vec<Candidate>, BackendError>;

    /// Load a direct URI (track or playlist)
    async fn load(&self, uri: &str) -> Result<LoadResult, BackendError>;
}
