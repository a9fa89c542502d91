//! Shared fakes for vcmp-pd integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vcmp_common::config::TomlConfig;
use vcmp_common::{BackendKind, Candidate, CanonicalTrackDescriptor, Requester, Track};
use vcmp_pd::autoplay::{PlaybackSession, SessionDirectory};
use vcmp_pd::backends::{AudioBackend, BackendError, LoadResult};
use vcmp_pd::catalog::{CatalogCollection, CatalogError, CollectionKind, TrackCatalog};
use vcmp_pd::recommendation::{ProviderError, RecommendationProvider};
use vcmp_pd::resolver::Resolver;
use vcmp_pd::search_gateway::SearchGateway;

pub fn candidate(title: &str, author: &str, duration_ms: u64, backend: BackendKind) -> Candidate {
    Candidate {
        title: title.to_string(),
        author: author.to_string(),
        uri: format!("{}://{}/{}", backend, author, title).replace(' ', "-"),
        duration_ms,
        backend,
        thumbnail: None,
        encoded: Some("encoded".to_string()),
    }
}

pub fn user_track(title: &str, author: &str) -> Track {
    Track::new(
        candidate(title, author, 200_000, BackendKind::SoundCloud),
        Requester::User("u1".to_string()),
    )
}

/// Audio backend with scripted answers
///
/// Exact `(backend, query)` scripts win; otherwise the library is searched
/// for candidates of that backend whose lowercase title occurs in the
/// lowercase query.
#[derive(Default)]
pub struct FakeBackend {
    scripted: Mutex<HashMap<(BackendKind, String), Vec<Candidate>>>,
    library: Mutex<Vec<Candidate>>,
    loads: Mutex<HashMap<String, LoadResult>>,
    failing: Mutex<HashSet<BackendKind>>,
    searches: Mutex<Vec<(BackendKind, String)>>,
    load_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, backend: BackendKind, query: &str, results: Vec<Candidate>) {
        self.scripted
            .lock()
            .unwrap()
            .insert((backend, query.to_string()), results);
    }

    pub fn add_to_library(&self, candidate: Candidate) {
        self.library.lock().unwrap().push(candidate);
    }

    pub fn script_load(&self, uri: &str, result: LoadResult) {
        self.loads.lock().unwrap().insert(uri.to_string(), result);
    }

    pub fn fail(&self, backend: BackendKind) {
        self.failing.lock().unwrap().insert(backend);
    }

    pub fn searches(&self) -> Vec<(BackendKind, String)> {
        self.searches.lock().unwrap().clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn search(
        &self,
        query: &str,
        backend: BackendKind,
    ) -> Result<Vec<Candidate>, BackendError> {
        self.searches
            .lock()
            .unwrap()
            .push((backend, query.to_string()));

        if self.failing.lock().unwrap().contains(&backend) {
            return Err(BackendError::Network(format!("{} unreachable", backend)));
        }

        if let Some(results) = self
            .scripted
            .lock()
            .unwrap()
            .get(&(backend, query.to_string()))
        {
            return Ok(results.clone());
        }

        let query = query.to_lowercase();
        Ok(self
            .library
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.backend == backend && query.contains(&c.title.to_lowercase()))
            .cloned()
            .collect())
    }

    async fn load(&self, uri: &str) -> Result<LoadResult, BackendError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.loads
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| BackendError::LoadFailed {
                severity: "common".to_string(),
                message: "This video is unavailable".to_string(),
            })
    }
}

/// Streaming catalog with fixed contents
#[derive(Default)]
pub struct FakeCatalog {
    pub tracks: HashMap<String, CanonicalTrackDescriptor>,
    pub collections: HashMap<String, CatalogCollection>,
}

#[async_trait]
impl TrackCatalog for FakeCatalog {
    async fn track(&self, id: &str) -> Result<CanonicalTrackDescriptor, CatalogError> {
        self.tracks
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn collection(
        &self,
        _kind: CollectionKind,
        id: &str,
        limit: usize,
    ) -> Result<CatalogCollection, CatalogError> {
        let mut collection = self
            .collections
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        collection.tracks.truncate(limit);
        Ok(collection)
    }
}

pub fn resolver(backend: Arc<FakeBackend>, catalog: Option<FakeCatalog>) -> Arc<Resolver> {
    let config = TomlConfig::default();
    let gateway = Arc::new(SearchGateway::new(backend, &config.search));
    let catalog = catalog.map(|c| Arc::new(c) as Arc<dyn TrackCatalog>);
    Arc::new(Resolver::new(gateway, catalog, config.search.playlist_limit))
}

/// What a [`FakeProvider`] does when called
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply(String),
    Fail,
    RateLimited,
    Hang,
}

/// Recommendation provider with a call counter
pub struct FakeProvider {
    name: String,
    requests_per_minute: u32,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: &str, requests_per_minute: u32, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            requests_per_minute,
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        })
    }

    /// Provider answering with the given `(artist, title)` pairs
    pub fn replying(name: &str, songs: &[(&str, &str)]) -> Arc<Self> {
        Self::new(name, 10, Behavior::Reply(recommendation_json(songs)))
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn recommendation_json(songs: &[(&str, &str)]) -> String {
    let entries: Vec<_> = songs
        .iter()
        .map(|(artist, title)| {
            serde_json::json!({
                "title": title,
                "artist": artist,
                "reason": "similar mood",
                "similarity": 0.8
            })
        })
        .collect();
    format!(
        "```json\n{}\n```",
        serde_json::json!({ "recommendations": entries })
    )
}

#[async_trait]
impl RecommendationProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Reply(text) => Ok(text),
            Behavior::Fail => Err(ProviderError::Api(500, "internal error".to_string())),
            Behavior::RateLimited => Err(ProviderError::RateLimited("quota".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

/// Playback session recording what autoplay enqueues
pub struct FakeSession {
    id: String,
    autoplay: AtomicBool,
    now_playing: Mutex<Option<Track>>,
    queue: Mutex<Vec<Track>>,
}

impl FakeSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            autoplay: AtomicBool::new(true),
            now_playing: Mutex::new(None),
            queue: Mutex::new(Vec::new()),
        })
    }

    pub fn set_autoplay(&self, enabled: bool) {
        self.autoplay.store(enabled, Ordering::SeqCst);
    }

    pub fn play(&self, track: Track) {
        *self.now_playing.lock().unwrap() = Some(track);
    }

    pub fn queued(&self) -> Vec<Track> {
        self.queue.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn autoplay_enabled(&self) -> bool {
        self.autoplay.load(Ordering::SeqCst)
    }

    fn now_playing(&self) -> Option<Track> {
        self.now_playing.lock().unwrap().clone()
    }

    fn queued_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    async fn enqueue(&self, track: Track) -> vcmp_common::Result<()> {
        self.queue.lock().unwrap().push(track);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    sessions: Mutex<HashMap<String, Arc<FakeSession>>>,
}

impl FakeDirectory {
    pub fn insert(&self, session: Arc<FakeSession>) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id().to_string(), session);
    }
}

impl SessionDirectory for FakeDirectory {
    fn session(&self, session_id: &str) -> Option<Arc<dyn PlaybackSession>> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .map(|s| s as Arc<dyn PlaybackSession>)
    }
}
