//! Lavalink v4 REST client
//!
//! Uses the `/v4/loadtracks` endpoint for both searching (with a source
//! prefix such as `ytsearch:`) and loading direct URLs.
//!
//! # API Reference
//! - Endpoint: `GET {base}/v4/loadtracks?identifier=...`
//! - Auth: `Authorization: <password>` header
//! - Load types: `track`, `playlist`, `search`, `empty`, `error`

use super::{AudioBackend, BackendError, LoadResult};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use vcmp_common::config::LavalinkConfig;
use vcmp_common::{BackendKind, Candidate};

const USER_AGENT: &str = concat!("vcmp-pd/", env!("CARGO_PKG_VERSION"));

/// Envelope of every `/v4/loadtracks` reply
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadResponse {
    load_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LavalinkTrack {
    encoded: String,
    info: LavalinkTrackInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LavalinkTrackInfo {
    identifier: String,
    author: String,
    /// Length in milliseconds
    length: u64,
    #[serde(default)]
    is_stream: bool,
    title: String,
    uri: Option<String>,
    artwork_url: Option<String>,
    source_name: String,
}

#[derive(Debug, Deserialize)]
struct LavalinkPlaylist {
    info: LavalinkPlaylistInfo,
    tracks: Vec<LavalinkTrack>,
}

#[derive(Debug, Deserialize)]
struct LavalinkPlaylistInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LavalinkException {
    message: Option<String>,
    severity: String,
}

impl From<LavalinkTrack> for Candidate {
    fn from(track: LavalinkTrack) -> Self {
        let info = track.info;
        Candidate {
            uri: info.uri.unwrap_or(info.identifier),
            title: info.title,
            author: info.author,
            duration_ms: if info.is_stream { 0 } else { info.length },
            backend: BackendKind::from_source_name(&info.source_name),
            thumbnail: info.artwork_url,
            encoded: Some(track.encoded),
        }
    }
}

/// Lavalink v4 audio backend
pub struct LavalinkBackend {
    http_client: Client,
    base_url: String,
    password: String,
}

impl LavalinkBackend {
    pub fn new(config: &LavalinkConfig) -> Result<Self, BackendError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            password: config.password.clone(),
        })
    }

    async fn load_tracks(&self, identifier: &str) -> Result<LoadResponse, BackendError> {
        let url = format!("{}/v4/loadtracks", self.base_url);

        debug!(identifier = %identifier, "Querying Lavalink loadtracks");

        let response = self
            .http_client
            .get(&url)
            .query(&[("identifier", identifier)])
            .header(header::AUTHORIZATION, &self.password)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

/// Convert a raw load response into a [`LoadResult`]
fn parse_load_response(response: LoadResponse) -> Result<LoadResult, BackendError> {
    let parse_err = |e: serde_json::Error| BackendError::Parse(e.to_string());

    match response.load_type.as_str() {
        "track" => {
            let track: LavalinkTrack = serde_json::from_value(response.data).map_err(parse_err)?;
            Ok(LoadResult::Track(track.into()))
        }
        "playlist" => {
            let playlist: LavalinkPlaylist =
                serde_json::from_value(response.data).map_err(parse_err)?;
            Ok(LoadResult::Playlist {
                name: playlist.info.name,
                tracks: playlist.tracks.into_iter().map(Candidate::from).collect(),
            })
        }
        "search" => {
            let tracks: Vec<LavalinkTrack> =
                serde_json::from_value(response.data).map_err(parse_err)?;
            Ok(LoadResult::Playlist {
                name: String::new(),
                tracks: tracks.into_iter().map(Candidate::from).collect(),
            })
        }
        "empty" => Ok(LoadResult::Empty),
        "error" => {
            let exception: LavalinkException =
                serde_json::from_value(response.data).map_err(parse_err)?;
            Err(BackendError::LoadFailed {
                severity: exception.severity,
                message: exception.message.unwrap_or_default(),
            })
        }
        other => Err(BackendError::Parse(format!("Unknown loadType '{}'", other))),
    }
}

#[async_trait]
impl AudioBackend for LavalinkBackend {
    fn name(&self) -> &str {
        "lavalink"
    }

    async fn search(
        &self,
        query: &str,
        backend: BackendKind,
    ) -> Result<Vec<Candidate>, BackendError> {
        let prefix = backend
            .search_prefix()
            .ok_or(BackendError::Unsearchable(backend))?;
        let identifier = format!("{}{}", prefix, query);

        let result = parse_load_response(self.load_tracks(&identifier).await?)?;
        let candidates = match result {
            LoadResult::Track(candidate) => vec![candidate],
            LoadResult::Playlist { tracks, .. } => tracks,
            LoadResult::Empty => Vec::new(),
        };

        debug!(
            query = %query,
            backend = %backend,
            results = candidates.len(),
            "Lavalink search complete"
        );

        Ok(candidates)
    }

    async fn load(&self, uri: &str) -> Result<LoadResult, BackendError> {
        parse_load_response(self.load_tracks(uri).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track_json(title: &str, source: &str) -> serde_json::Value {
        json!({
            "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
            "info": {
                "identifier": "dQw4w9WgXcQ",
                "isSeekable": true,
                "author": "RickAstleyVEVO",
                "length": 212000,
                "isStream": false,
                "position": 0,
                "title": title,
                "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                "artworkUrl": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
                "isrc": null,
                "sourceName": source
            },
            "pluginInfo": {},
            "userData": {}
        })
    }

    fn response(value: serde_json::Value) -> LoadResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_track() {
        let result = parse_load_response(response(json!({
            "loadType": "track",
            "data": track_json("Never Gonna Give You Up", "youtube")
        })))
        .unwrap();

        let LoadResult::Track(candidate) = result else {
            panic!("expected track");
        };
        assert_eq!(candidate.title, "Never Gonna Give You Up");
        assert_eq!(candidate.backend, BackendKind::YouTube);
        assert_eq!(candidate.duration_ms, 212_000);
        assert!(candidate.encoded.is_some());
    }

    #[test]
    fn test_parse_search_and_playlist() {
        let search = parse_load_response(response(json!({
            "loadType": "search",
            "data": [track_json("A", "soundcloud"), track_json("B", "soundcloud")]
        })))
        .unwrap();
        let LoadResult::Playlist { tracks, .. } = search else {
            panic!("expected list");
        };
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].backend, BackendKind::SoundCloud);

        let playlist = parse_load_response(response(json!({
            "loadType": "playlist",
            "data": {
                "info": { "name": "Mix", "selectedTrack": -1 },
                "pluginInfo": {},
                "tracks": [track_json("A", "youtube")]
            }
        })))
        .unwrap();
        assert!(matches!(playlist, LoadResult::Playlist { ref name, .. } if name == "Mix"));
    }

    #[test]
    fn test_parse_empty_and_error() {
        let empty = parse_load_response(response(json!({ "loadType": "empty", "data": {} })));
        assert_eq!(empty.unwrap(), LoadResult::Empty);

        let error = parse_load_response(response(json!({
            "loadType": "error",
            "data": { "message": "Video unavailable", "severity": "common", "cause": "..." }
        })));
        assert!(matches!(
            error,
            Err(BackendError::LoadFailed { ref message, .. }) if message == "Video unavailable"
        ));
    }

    #[test]
    fn test_streams_report_unknown_duration() {
        let mut value = track_json("Radio", "http");
        value["info"]["isStream"] = json!(true);
        let track: LavalinkTrack = serde_json::from_value(value).unwrap();
        let candidate = Candidate::from(track);
        assert_eq!(candidate.duration_ms, 0);
        assert_eq!(candidate.backend, BackendKind::Other);
    }

    #[test]
    fn test_client_creation_trims_base_url() {
        let backend = LavalinkBackend::new(&LavalinkConfig {
            url: "http://localhost:2333/".to_string(),
            password: "pw".to_string(),
            request_timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(backend.base_url, "http://localhost:2333");
    }
}
