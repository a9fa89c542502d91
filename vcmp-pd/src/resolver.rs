//! Query Classifier & Cross-Platform Resolver
//!
//! Turns whatever a user typed into playable tracks:
//!
//! - **Streaming links** (Spotify track/album/playlist): fetch canonical
//!   metadata from the catalog, then search the audio backends and let the
//!   scorer pick the best upload.
//! - **Direct backend URLs**: load directly. Links to a backend that is
//!   unreliable for playback get a second chance on an alternate backend.
//! - **Free text**: search the default backend and take its top hit.
//!
//! `resolve` never fails; "nothing found" is an empty [`ResolutionResult`].

use crate::backends::LoadResult;
use crate::catalog::{CollectionKind, TrackCatalog};
use crate::scorer;
use crate::search_gateway::{SearchGateway, SearchRequest};
use crate::{ResolveError, ResolveResult};
use crate::text::{clean_artist, clean_title};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vcmp_common::{BackendKind, Candidate, CanonicalTrackDescriptor, Requester, Track};

static SPOTIFY_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://open\.spotify\.com/(?:intl-[a-zA-Z-]+/)?(track|album|playlist)/([A-Za-z0-9]+)",
    )
    .expect("spotify url regex is valid")
});

static SPOTIFY_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^spotify:(track|album|playlist):([A-Za-z0-9]+)$")
        .expect("spotify uri regex is valid")
});

static YOUTUBE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:(?:www|m|music)\.)?(?:youtube\.com|youtu\.be)/")
        .expect("youtube url regex is valid")
});

static YOUTUBE_VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[?&]v=|youtu\.be/|/shorts/|/embed/|/live/)([A-Za-z0-9_-]{11})")
        .expect("youtube video id regex is valid")
});

static SOUNDCLOUD_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:(?:www|m|on)\.)?soundcloud\.(?:com|app\.goo\.gl)/")
        .expect("soundcloud url regex is valid")
});

static HTTP_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+$").expect("http url regex is valid"));

/// Classified user query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Streaming-service single track
    StreamingTrack { id: String },
    /// Streaming-service album or playlist
    StreamingCollection { kind: CollectionKind, id: String },
    /// URL the audio server can load itself
    DirectUrl { url: String, backend: BackendKind },
    /// Anything else
    FreeText(String),
}

/// Classify a query by pattern alone (no network)
pub fn classify(query: &str) -> QueryKind {
    let query = query.trim();

    let spotify = SPOTIFY_URL_RE
        .captures(query)
        .or_else(|| SPOTIFY_URI_RE.captures(query));
    if let Some(caps) = spotify {
        let id = caps[2].to_string();
        return match &caps[1] {
            "track" => QueryKind::StreamingTrack { id },
            "album" => QueryKind::StreamingCollection {
                kind: CollectionKind::Album,
                id,
            },
            _ => QueryKind::StreamingCollection {
                kind: CollectionKind::Playlist,
                id,
            },
        };
    }

    if YOUTUBE_URL_RE.is_match(query) {
        return QueryKind::DirectUrl {
            url: query.to_string(),
            backend: BackendKind::YouTube,
        };
    }
    if SOUNDCLOUD_URL_RE.is_match(query) {
        return QueryKind::DirectUrl {
            url: query.to_string(),
            backend: BackendKind::SoundCloud,
        };
    }
    if HTTP_URL_RE.is_match(query) {
        return QueryKind::DirectUrl {
            url: query.to_string(),
            backend: BackendKind::Other,
        };
    }

    QueryKind::FreeText(query.to_string())
}

/// YouTube video id embedded in a URL
pub fn youtube_video_id(url: &str) -> Option<&str> {
    YOUTUBE_VIDEO_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Shape of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Single,
    Playlist,
}

/// Tracks produced for one query
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    pub kind: ResolutionKind,
    pub tracks: Vec<Track>,
    /// Album or playlist name, when known
    pub playlist_name: Option<String>,
}

impl ResolutionResult {
    fn single(track: Track) -> Self {
        Self {
            kind: ResolutionKind::Single,
            tracks: vec![track],
            playlist_name: None,
        }
    }

    fn playlist(name: Option<String>, tracks: Vec<Track>) -> Self {
        Self {
            kind: ResolutionKind::Playlist,
            tracks,
            playlist_name: name,
        }
    }

    /// "Not found"
    pub fn empty() -> Self {
        Self {
            kind: ResolutionKind::Single,
            tracks: Vec::new(),
            playlist_name: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Cross-platform resolver
pub struct Resolver {
    gateway: Arc<SearchGateway>,
    catalog: Option<Arc<dyn TrackCatalog>>,
    playlist_limit: usize,
}

impl Resolver {
    /// `catalog` is `None` when no streaming credentials are configured
    pub fn new(
        gateway: Arc<SearchGateway>,
        catalog: Option<Arc<dyn TrackCatalog>>,
        playlist_limit: usize,
    ) -> Self {
        Self {
            gateway,
            catalog,
            playlist_limit: playlist_limit.max(1),
        }
    }

    pub fn gateway(&self) -> &Arc<SearchGateway> {
        &self.gateway
    }

    /// Resolve a user query into playable tracks
    pub async fn resolve(&self, query: &str, requester: Requester) -> ResolutionResult {
        let resolution_id = Uuid::new_v4();
        let kind = classify(query);

        debug!(
            resolution_id = %resolution_id,
            query = %query,
            kind = ?kind,
            "Resolving query"
        );

        let result = match kind {
            QueryKind::StreamingTrack { id } => self.resolve_streaming_track(&id, requester).await,
            QueryKind::StreamingCollection { kind, id } => {
                self.resolve_streaming_collection(kind, &id, requester).await
            }
            QueryKind::DirectUrl { url, backend } => {
                self.resolve_direct(&url, backend, requester).await
            }
            QueryKind::FreeText(text) => self.resolve_free_text(&text, requester).await,
        };

        info!(
            resolution_id = %resolution_id,
            query = %query,
            kind = ?result.kind,
            tracks = result.tracks.len(),
            "Resolution complete"
        );

        result
    }

    /// Best playable candidate for a canonical descriptor
    ///
    /// Runs the scored multi-backend search. When nothing acceptable comes
    /// back, the top hit of a plain `"{artist} {title}"` search on the
    /// default backend is accepted as-is.
    pub async fn resolve_canonical(
        &self,
        canonical: &CanonicalTrackDescriptor,
    ) -> Option<Candidate> {
        let primary = playback_primary(self.gateway.default_backend());
        let candidates = match self.gateway.search_all(canonical_requests(canonical)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(
                    artist = %canonical.artist,
                    title = %canonical.title,
                    error = %e,
                    "Scored search failed, trying degraded search"
                );
                Vec::new()
            }
        };

        let best_effort = match scorer::pick_best(canonical, &candidates, primary) {
            Some(selection) if selection.is_acceptable() => {
                debug!(
                    artist = %canonical.artist,
                    title = %canonical.title,
                    pick = %selection.scored.candidate.title,
                    score = selection.scored.score,
                    tier = ?selection.tier,
                    "Selected candidate"
                );
                return Some(selection.scored.candidate);
            }
            Some(selection) => Some(selection.scored.candidate),
            None => None,
        };

        match self.degraded_search(canonical).await {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                debug!(error = %e, "Degraded search found nothing");
                best_effort
            }
        }
    }

    /// Top hit of a plain text search on the default backend, unscored
    async fn degraded_search(&self, canonical: &CanonicalTrackDescriptor) -> ResolveResult<Candidate> {
        let query = canonical.search_text();
        let top = self.gateway.search(&query, None).await?.into_iter().next();
        match top {
            Some(candidate) => {
                debug!(query = %query, pick = %candidate.title, "Accepted degraded search result");
                Ok(candidate)
            }
            None => Err(ResolveError::NoCandidatesFound(query)),
        }
    }

    async fn resolve_streaming_track(&self, id: &str, requester: Requester) -> ResolutionResult {
        let Some(catalog) = self.catalog.as_ref() else {
            warn!(id = %id, "Streaming link received but no catalog credentials are configured");
            return ResolutionResult::empty();
        };

        let canonical = match catalog.track(id).await {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(id = %id, error = %e, "Catalog track lookup failed");
                return ResolutionResult::empty();
            }
        };

        match self.resolve_canonical(&canonical).await {
            Some(candidate) => ResolutionResult::single(Track::new(candidate, requester)),
            None => ResolutionResult::empty(),
        }
    }

    async fn resolve_streaming_collection(
        &self,
        kind: CollectionKind,
        id: &str,
        requester: Requester,
    ) -> ResolutionResult {
        let Some(catalog) = self.catalog.as_ref() else {
            warn!(id = %id, "Streaming link received but no catalog credentials are configured");
            return ResolutionResult::empty();
        };

        let collection = match catalog.collection(kind, id, self.playlist_limit).await {
            Ok(collection) => collection,
            Err(e) => {
                warn!(id = %id, kind = ?kind, error = %e, "Catalog collection lookup failed");
                return ResolutionResult::empty();
            }
        };

        let descriptors: Vec<_> = collection
            .tracks
            .into_iter()
            .take(self.playlist_limit)
            .collect();
        let requested = descriptors.len();

        let resolved = join_all(
            descriptors
                .iter()
                .map(|canonical| self.resolve_canonical(canonical)),
        )
        .await;

        let tracks: Vec<Track> = resolved
            .into_iter()
            .flatten()
            .map(|candidate| Track::new(candidate, requester.clone()))
            .collect();

        info!(
            name = %collection.name,
            requested,
            resolved = tracks.len(),
            "Imported collection"
        );

        ResolutionResult::playlist(Some(collection.name), tracks)
    }

    async fn resolve_direct(
        &self,
        url: &str,
        backend: BackendKind,
        requester: Requester,
    ) -> ResolutionResult {
        match self.gateway.load(url).await {
            Ok(LoadResult::Track(candidate)) => {
                return ResolutionResult::single(Track::new(candidate, requester));
            }
            Ok(LoadResult::Playlist { name, tracks }) if !tracks.is_empty() => {
                let tracks = tracks
                    .into_iter()
                    .take(self.playlist_limit)
                    .map(|candidate| Track::new(candidate, requester.clone()))
                    .collect();
                return ResolutionResult::playlist(Some(name).filter(|n| !n.is_empty()), tracks);
            }
            Ok(_) => debug!(url = %url, "Direct load returned nothing"),
            // Already logged by the gateway
            Err(_) => {}
        }

        if !backend.is_unreliable_for_playback() {
            return ResolutionResult::empty();
        }

        match self.resolve_on_alternate_backend(url, backend).await {
            Some(candidate) => ResolutionResult::single(Track::new(candidate, requester)),
            None => {
                warn!(url = %url, "Direct URL could not be resolved on any backend");
                ResolutionResult::empty()
            }
        }
    }

    /// Look up the title behind a failing URL, then resolve it elsewhere
    async fn resolve_on_alternate_backend(
        &self,
        url: &str,
        failed: BackendKind,
    ) -> Option<Candidate> {
        let video_id = youtube_video_id(url)?;

        let identity = match self.gateway.search(video_id, Some(failed)).await {
            Ok(candidates) => candidates.into_iter().next()?,
            Err(_) => return None,
        };

        let canonical =
            CanonicalTrackDescriptor::new(clean_artist(&identity.author), clean_title(&identity.title))
                .with_duration_ms(identity.duration_ms);
        let alternate = alternate_backend(failed, self.gateway.default_backend());
        let query = format!("{} {}", canonical.artist, canonical.title);

        debug!(
            url = %url,
            query = %query,
            backend = %alternate,
            "Retrying direct URL on alternate backend"
        );

        let candidates = self.gateway.search(&query, Some(alternate)).await.ok()?;
        scorer::pick_best(&canonical, &candidates, alternate).map(|s| s.scored.candidate)
    }

    async fn resolve_free_text(&self, text: &str, requester: Requester) -> ResolutionResult {
        match self.gateway.search(text, None).await {
            Ok(candidates) => match candidates.into_iter().next() {
                Some(candidate) => ResolutionResult::single(Track::new(candidate, requester)),
                None => ResolutionResult::empty(),
            },
            Err(_) => ResolutionResult::empty(),
        }
    }
}

/// Searches issued for one canonical descriptor, reliable backend first
fn canonical_requests(canonical: &CanonicalTrackDescriptor) -> Vec<SearchRequest> {
    vec![
        SearchRequest::new(
            format!("{} - {}", canonical.artist, canonical.title),
            BackendKind::SoundCloud,
        ),
        SearchRequest::new(
            format!("{} - {}", canonical.artist, canonical.title),
            BackendKind::YouTube,
        ),
        SearchRequest::new(
            format!("{} {} official audio", canonical.title, canonical.artist),
            BackendKind::YouTube,
        ),
    ]
}

/// Low-penalty backend whose clean results the selection rules prefer
///
/// The default search backend only qualifies when it is reliable for playback.
fn playback_primary(default: BackendKind) -> BackendKind {
    if default.search_prefix().is_some() && !default.is_unreliable_for_playback() {
        default
    } else {
        BackendKind::SoundCloud
    }
}

/// Searchable backend to retry on after `failed` could not play a URL
fn alternate_backend(failed: BackendKind, default: BackendKind) -> BackendKind {
    if default != failed && default.search_prefix().is_some() {
        return default;
    }
    match failed {
        BackendKind::SoundCloud => BackendKind::YouTube,
        _ => BackendKind::SoundCloud,
    }
}
