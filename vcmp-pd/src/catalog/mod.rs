//! Streaming-service catalogs
//!
//! A catalog turns a streaming-service link into canonical descriptors. It
//! never produces playable audio itself.

pub mod spotify;

pub use spotify::SpotifyCatalog;

use async_trait::async_trait;
use thiserror::Error;
use vcmp_common::CanonicalTrackDescriptor;

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Catalog API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Multi-track catalog entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Album,
    Playlist,
}

/// Tracks of an album or playlist
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCollection {
    pub name: String,
    pub tracks: Vec<CanonicalTrackDescriptor>,
}

/// Metadata lookups against a streaming catalog
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Canonical descriptor of a single track
    async fn track(&self, id: &str) -> Result<CanonicalTrackDescriptor, CatalogError>;

    /// Tracks of an album or playlist, at most `limit`
    async fn collection(
        &self,
        kind: CollectionKind,
        id: &str,
        limit: usize,
    ) -> Result<CatalogCollection, CatalogError>;
}
