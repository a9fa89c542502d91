//! Track value types shared between the resolver, the autoplay manager
//! and the playback layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio backend a candidate was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// YouTube-indexed backend
    YouTube,
    /// SoundCloud-indexed backend
    SoundCloud,
    /// Any other source the audio server can load directly (HTTP streams, Bandcamp, ...)
    Other,
}

impl BackendKind {
    /// Search prefix understood by the audio server, if the backend is searchable
    pub fn search_prefix(self) -> Option<&'static str> {
        match self {
            BackendKind::YouTube => Some("ytsearch:"),
            BackendKind::SoundCloud => Some("scsearch:"),
            BackendKind::Other => None,
        }
    }

    /// Whether tracks from this backend frequently fail to stream
    ///
    /// Unreliable candidates are penalised by the scorer and direct URLs
    /// pointing at them get an alternate-backend fallback.
    pub fn is_unreliable_for_playback(self) -> bool {
        matches!(self, BackendKind::YouTube)
    }

    /// Map an audio server `sourceName` to a backend
    pub fn from_source_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "youtube" | "youtubemusic" | "ytmusic" => BackendKind::YouTube,
            "soundcloud" => BackendKind::SoundCloud,
            _ => BackendKind::Other,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::YouTube => "youtube",
            BackendKind::SoundCloud => "soundcloud",
            BackendKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" | "yt" => Ok(BackendKind::YouTube),
            "soundcloud" | "sc" => Ok(BackendKind::SoundCloud),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown search backend: {}",
                other
            ))),
        }
    }
}

/// Ground-truth description of the track a user or recommender asked for
///
/// Produced from a streaming-service link or an AI recommendation; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTrackDescriptor {
    /// Artist credit; several artists are joined with ", " or " & "
    pub artist: String,
    /// Track title
    pub title: String,
    /// Track length in milliseconds, when the source knows it
    pub duration_ms: Option<u64>,
    /// Where the descriptor came from (catalog URI, ISRC, provider name)
    pub source_hint: Option<String>,
}

impl CanonicalTrackDescriptor {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            duration_ms: None,
            source_hint: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = (duration_ms > 0).then_some(duration_ms);
        self
    }

    pub fn with_source_hint(mut self, hint: impl Into<String>) -> Self {
        self.source_hint = Some(hint.into());
        self
    }

    /// Plain "{artist} {title}" search text
    pub fn search_text(&self) -> String {
        format!("{} {}", self.artist, self.title).trim().to_string()
    }
}

/// Raw, unscored result returned by an audio backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    /// Uploader / channel / credited artist as reported by the backend
    pub author: String,
    pub uri: String,
    /// Length in milliseconds (0 when the backend does not know, e.g. streams)
    pub duration_ms: u64,
    pub backend: BackendKind,
    pub thumbnail: Option<String>,
    /// Opaque playback handle issued by the audio server
    pub encoded: Option<String>,
}

/// Who asked for a track to be queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Requester {
    /// A chat user, identified by the command layer's user id
    User(String),
    /// Queued by the autoplay manager
    Autoplay,
}

/// A playable track ready to be queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    info: Candidate,
    requester: Requester,
}

impl Track {
    pub fn new(info: Candidate, requester: Requester) -> Self {
        Self { info, requester }
    }

    pub fn info(&self) -> &Candidate {
        &self.info
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn author(&self) -> &str {
        &self.info.author
    }

    pub fn uri(&self) -> &str {
        &self.info.uri
    }

    pub fn duration_ms(&self) -> u64 {
        self.info.duration_ms
    }

    pub fn backend(&self) -> BackendKind {
        self.info.backend
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn into_info(self) -> Candidate {
        self.info
    }
}
