//! Bounded per-session play history

use crate::text::{clean_artist, clean_title, title_key};
use std::collections::VecDeque;
use vcmp_common::{CanonicalTrackDescriptor, Track};

/// One played or autoplay-queued track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub title: String,
    pub artist: String,
    pub uri: String,
    /// Normalised title used for duplicate suppression
    pub key: String,
}

impl HistoryEntry {
    pub fn from_track(track: &Track) -> Self {
        Self {
            title: clean_title(track.title()),
            artist: clean_artist(track.author()),
            uri: track.uri().to_string(),
            key: title_key(track.title()),
        }
    }

    pub fn to_canonical(&self) -> CanonicalTrackDescriptor {
        CanonicalTrackDescriptor::new(self.artist.clone(), self.title.clone())
    }
}

/// FIFO history with a soft cap
///
/// When the length exceeds `soft_cap`, the oldest entries are dropped until
/// `trim_to` remain. Re-adding a track moves it to the end instead of
/// duplicating it.
#[derive(Debug, Clone)]
pub struct PlayHistory {
    entries: VecDeque<HistoryEntry>,
    soft_cap: usize,
    trim_to: usize,
}

impl PlayHistory {
    pub fn new(soft_cap: usize, trim_to: usize) -> Self {
        let soft_cap = soft_cap.max(1);
        Self {
            entries: VecDeque::new(),
            soft_cap,
            trim_to: trim_to.clamp(1, soft_cap),
        }
    }

    pub fn push(&mut self, track: &Track) {
        let entry = HistoryEntry::from_track(track);
        self.entries
            .retain(|e| e.uri != entry.uri && e.key != entry.key);
        self.entries.push_back(entry);

        if self.entries.len() > self.soft_cap {
            let excess = self.entries.len() - self.trim_to;
            self.entries.drain(..excess);
        }
    }

    /// Most recent `n` entries, oldest first, skipping `exclude_uri`
    pub fn recent(&self, n: usize, exclude_uri: Option<&str>) -> Vec<&HistoryEntry> {
        let mut recent: Vec<&HistoryEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|e| Some(e.uri.as_str()) != exclude_uri)
            .take(n)
            .collect();
        recent.reverse();
        recent
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
