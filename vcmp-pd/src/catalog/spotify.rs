//! Spotify Web API catalog client
//!
//! Uses the client-credentials flow; the access token is cached until
//! shortly before it expires.
//!
//! # API Reference
//! - Token: `POST https://accounts.spotify.com/api/token`
//! - Track: `GET /v1/tracks/{id}`
//! - Album: `GET /v1/albums/{id}` (tracks paginated via `next`)
//! - Playlist: `GET /v1/playlists/{id}` (tracks paginated via `next`)

use super::{CatalogCollection, CatalogError, CollectionKind, TrackCatalog};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use vcmp_common::config::SpotifyConfig;
use vcmp_common::CanonicalTrackDescriptor;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Refresh this long before the token actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    uri: Option<String>,
    #[serde(default)]
    is_local: bool,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: String,
    tracks: Page<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylist {
    name: String,
    tracks: Page<PlaylistItem>,
}

impl SpotifyTrack {
    /// Descriptor for a catalog track; `None` for local files and entries without artists
    fn into_descriptor(self) -> Option<CanonicalTrackDescriptor> {
        if self.is_local || self.artists.is_empty() || self.name.trim().is_empty() {
            return None;
        }

        let artist = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut descriptor =
            CanonicalTrackDescriptor::new(artist, self.name).with_duration_ms(self.duration_ms);
        if let Some(uri) = self.uri {
            descriptor = descriptor.with_source_hint(uri);
        }
        Some(descriptor)
    }
}

/// Spotify catalog client
pub struct SpotifyCatalog {
    http_client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyCatalog {
    pub fn new(config: &SpotifyConfig) -> Result<Self, CatalogError> {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    /// Current access token, fetching a new one when missing or about to expire
    async fn access_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http_client
            .post(TOKEN_URL)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(expires_in_secs = token.expires_in, "Obtained Spotify access token");

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// GET a JSON resource, retrying once with a fresh token on 401
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        for attempt in 0..2 {
            let token = self.access_token().await?;

            let response = self
                .http_client
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            match response.status() {
                status if status.is_success() => {
                    return response
                        .json()
                        .await
                        .map_err(|e| CatalogError::Parse(e.to_string()));
                }
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    warn!("Spotify token rejected, refreshing");
                    self.invalidate_token().await;
                }
                StatusCode::NOT_FOUND => return Err(CatalogError::NotFound(url.to_string())),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(CatalogError::Api(status.as_u16(), body));
                }
            }
        }

        Err(CatalogError::Auth("Spotify rejected a freshly issued token".to_string()))
    }

    /// Follow `next` links until `limit` tracks are collected
    async fn collect_pages<T, F>(
        &self,
        first: Page<T>,
        limit: usize,
        mut convert: F,
    ) -> Result<Vec<CanonicalTrackDescriptor>, CatalogError>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Option<CanonicalTrackDescriptor>,
    {
        let mut tracks = Vec::new();
        let mut page = first;

        loop {
            for item in page.items {
                if tracks.len() >= limit {
                    return Ok(tracks);
                }
                if let Some(descriptor) = convert(item) {
                    tracks.push(descriptor);
                }
            }

            match page.next {
                Some(next) if tracks.len() < limit => {
                    page = self.get_json(&next).await?;
                }
                _ => return Ok(tracks),
            }
        }
    }
}

#[async_trait]
impl TrackCatalog for SpotifyCatalog {
    async fn track(&self, id: &str) -> Result<CanonicalTrackDescriptor, CatalogError> {
        let track: SpotifyTrack = self.get_json(&format!("{}/tracks/{}", API_BASE_URL, id)).await?;
        track
            .into_descriptor()
            .ok_or_else(|| CatalogError::NotFound(format!("spotify:track:{}", id)))
    }

    async fn collection(
        &self,
        kind: CollectionKind,
        id: &str,
        limit: usize,
    ) -> Result<CatalogCollection, CatalogError> {
        let collection = match kind {
            CollectionKind::Album => {
                let album: SpotifyAlbum =
                    self.get_json(&format!("{}/albums/{}", API_BASE_URL, id)).await?;
                let tracks = self
                    .collect_pages(album.tracks, limit, SpotifyTrack::into_descriptor)
                    .await?;
                CatalogCollection {
                    name: album.name,
                    tracks,
                }
            }
            CollectionKind::Playlist => {
                let playlist: SpotifyPlaylist = self
                    .get_json(&format!("{}/playlists/{}", API_BASE_URL, id))
                    .await?;
                let tracks = self
                    .collect_pages(playlist.tracks, limit, |item: PlaylistItem| {
                        item.track.and_then(SpotifyTrack::into_descriptor)
                    })
                    .await?;
                CatalogCollection {
                    name: playlist.name,
                    tracks,
                }
            }
        };

        debug!(
            id = %id,
            kind = ?kind,
            name = %collection.name,
            tracks = collection.tracks.len(),
            "Fetched Spotify collection"
        );

        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_track_descriptor_joins_artists() {
        let track: SpotifyTrack = serde_json::from_value(json!({
            "name": "Under Pressure",
            "duration_ms": 248_000,
            "artists": [{ "name": "Queen" }, { "name": "David Bowie" }],
            "uri": "spotify:track:2fuCquhmrzHpu5xcA1ci9x",
            "is_local": false
        }))
        .unwrap();

        let descriptor = track.into_descriptor().unwrap();
        assert_eq!(descriptor.artist, "Queen, David Bowie");
        assert_eq!(descriptor.title, "Under Pressure");
        assert_eq!(descriptor.duration_ms, Some(248_000));
        assert_eq!(
            descriptor.source_hint.as_deref(),
            Some("spotify:track:2fuCquhmrzHpu5xcA1ci9x")
        );
    }

    #[test]
    fn test_local_and_artistless_tracks_are_skipped() {
        let local: SpotifyTrack = serde_json::from_value(json!({
            "name": "My Demo",
            "duration_ms": 1000,
            "artists": [{ "name": "Me" }],
            "is_local": true
        }))
        .unwrap();
        assert!(local.into_descriptor().is_none());

        let episode: SpotifyTrack =
            serde_json::from_value(json!({ "name": "Podcast Episode", "duration_ms": 1000 }))
                .unwrap();
        assert!(episode.into_descriptor().is_none());
    }

    #[test]
    fn test_playlist_page_tolerates_null_tracks() {
        let playlist: SpotifyPlaylist = serde_json::from_value(json!({
            "name": "Road Trip",
            "tracks": {
                "items": [
                    { "track": null },
                    { "track": { "name": "Song", "duration_ms": 1, "artists": [{ "name": "A" }] } }
                ],
                "next": null
            }
        }))
        .unwrap();
        assert_eq!(playlist.tracks.items.len(), 2);
        assert!(playlist.tracks.items[0].track.is_none());
    }

    #[tokio::test]
    async fn test_collect_pages_stops_at_limit() {
        let catalog = SpotifyCatalog::new(&SpotifyConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        })
        .unwrap();

        let items = (0..10)
            .map(|i| SpotifyTrack {
                name: format!("Song {}", i),
                duration_ms: 1000,
                artists: vec![SpotifyArtist {
                    name: "A".to_string(),
                }],
                uri: None,
                is_local: false,
            })
            .collect();
        // `next` is set, but the limit is reached before it would be followed
        let page = Page {
            items,
            next: Some("https://api.spotify.com/v1/unreachable".to_string()),
        };

        let tracks = catalog
            .collect_pages(page, 4, SpotifyTrack::into_descriptor)
            .await
            .unwrap();
        assert_eq!(tracks.len(), 4);
        assert_eq!(tracks[3].title, "Song 3");
    }
}
