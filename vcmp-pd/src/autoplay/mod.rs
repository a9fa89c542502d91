//! Autoplay Continuity Manager
//!
//! Keeps a session's queue from running dry. Two triggers feed one decision
//! routine:
//!
//! - **Proactive:** a track started and at most one track is still queued
//! - **Reactive:** the queue became empty
//!
//! Per-session phase `Idle → Deciding → Resolving → Idle`; a trigger that
//! arrives while the session is not `Idle`, or within the debounce window
//! of the previous trigger, is dropped.
//!
//! Decision tiers, first success wins and at most one track is enqueued:
//!
//! 1. AI recommendations (duplicates of recent history dropped), up to three
//!    resolved in order
//! 2. `"{artist} popular"` on the default backend
//! 3. A random generic popularity query, random pick among the top five
//!
//! When every tier fails the session is left alone.

pub mod history;

pub use history::{HistoryEntry, PlayHistory};

use crate::recommendation::{ProviderGateway, RecommendationOptions};
use crate::resolver::Resolver;
use crate::text::{clean_artist, clean_title, title_key};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vcmp_common::config::AutoplayConfig;
use vcmp_common::events::{EventBus, PlaybackEvent};
use vcmp_common::{Candidate, CanonicalTrackDescriptor, Requester, Track};

/// History entries sent to the recommendation gateway
pub const RECOMMENDATION_HISTORY: usize = 5;
/// History entries checked for duplicate suppression
pub const SUPPRESSION_HISTORY: usize = 10;
/// Recommendations tried before falling back
pub const MAX_RESOLUTION_ATTEMPTS: usize = 3;
/// Results the generic tier picks from
pub const GENERIC_PICK_POOL: usize = 5;

/// Playback session capabilities the manager relies on
#[async_trait]
pub trait PlaybackSession: Send + Sync {
    fn session_id(&self) -> &str;

    fn autoplay_enabled(&self) -> bool;

    /// Track currently playing, if any
    fn now_playing(&self) -> Option<Track>;

    /// Tracks waiting after the current one
    fn queued_len(&self) -> usize;

    async fn enqueue(&self, track: Track) -> vcmp_common::Result<()>;
}

/// Lookup of live sessions by id
pub trait SessionDirectory: Send + Sync {
    fn session(&self, session_id: &str) -> Option<Arc<dyn PlaybackSession>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayPhase {
    Idle,
    Deciding,
    Resolving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Proactive,
    Reactive,
}

/// Why a trigger did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// Queue still has more than one track
    QueueSufficient,
    Debounced,
    /// Another decision for this session is running
    InFlight,
}

/// Which tier produced the enqueued track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayTier {
    Recommendation,
    ArtistPopular,
    Generic,
}

/// Result of one trigger
#[derive(Debug, Clone, PartialEq)]
pub enum AutoplayOutcome {
    Skipped(SkipReason),
    Enqueued { track: Track, tier: AutoplayTier },
    /// Every tier failed; nothing was added
    Stalled,
}

#[derive(Debug)]
struct SessionState {
    history: PlayHistory,
    phase: AutoplayPhase,
    last_trigger_at: Option<Instant>,
    last_started: Option<Track>,
}

/// Inputs of one decision, captured under the state lock
struct DecisionInput {
    seed: Option<CanonicalTrackDescriptor>,
    history: Vec<CanonicalTrackDescriptor>,
    suppressed: HashSet<String>,
}

/// Resets the session phase to `Idle` when a decision ends, however it ends
struct PhaseGuard<'a> {
    manager: &'a AutoplayManager,
    session_id: String,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.manager.set_phase(&self.session_id, AutoplayPhase::Idle);
    }
}

/// Autoplay manager shared by every session
pub struct AutoplayManager {
    resolver: Arc<Resolver>,
    recommendations: Arc<ProviderGateway>,
    debounce: Duration,
    history_soft_cap: usize,
    history_trim_to: usize,
    generic_queries: Vec<String>,
    recommendation_count: usize,
    rng: Mutex<StdRng>,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl AutoplayManager {
    /// `rng` drives the generic fallback tier; seed it for reproducible picks
    pub fn new(
        resolver: Arc<Resolver>,
        recommendations: Arc<ProviderGateway>,
        config: &AutoplayConfig,
        recommendation_count: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            resolver,
            recommendations,
            debounce: Duration::from_millis(config.debounce_ms),
            history_soft_cap: config.history_soft_cap,
            history_trim_to: config.history_trim_to,
            generic_queries: config.generic_queries.clone(),
            recommendation_count: recommendation_count.max(1),
            rng: Mutex::new(rng),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_entropy(
        resolver: Arc<Resolver>,
        recommendations: Arc<ProviderGateway>,
        config: &AutoplayConfig,
        recommendation_count: usize,
    ) -> Self {
        Self::new(
            resolver,
            recommendations,
            config,
            recommendation_count,
            StdRng::from_entropy(),
        )
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionState>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_state<T>(&self, session_id: &str, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut sessions = self.sessions();
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState {
                history: PlayHistory::new(self.history_soft_cap, self.history_trim_to),
                phase: AutoplayPhase::Idle,
                last_trigger_at: None,
                last_started: None,
            });
        f(state)
    }

    fn set_phase(&self, session_id: &str, phase: AutoplayPhase) {
        if let Some(state) = self.sessions().get_mut(session_id) {
            state.phase = phase;
        }
    }

    /// Current phase (sessions never seen are `Idle`)
    pub fn phase(&self, session_id: &str) -> AutoplayPhase {
        self.sessions()
            .get(session_id)
            .map(|s| s.phase)
            .unwrap_or(AutoplayPhase::Idle)
    }

    /// Recent history, oldest first
    pub fn history(&self, session_id: &str) -> Vec<HistoryEntry> {
        self.sessions()
            .get(session_id)
            .map(|s| s.history.recent(usize::MAX, None).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all state for a closed session
    pub fn forget_session(&self, session_id: &str) {
        if self.sessions().remove(session_id).is_some() {
            debug!(session_id = %session_id, "Autoplay state dropped");
        }
    }

    /// A track started: record it, then continue proactively if the queue is short
    pub async fn on_track_start(
        &self,
        session: &dyn PlaybackSession,
        track: &Track,
    ) -> AutoplayOutcome {
        self.with_state(session.session_id(), |state| {
            state.history.push(track);
            state.last_started = Some(track.clone());
        });

        if !session.autoplay_enabled() {
            return AutoplayOutcome::Skipped(SkipReason::Disabled);
        }
        if session.queued_len() > 1 {
            return AutoplayOutcome::Skipped(SkipReason::QueueSufficient);
        }

        self.trigger(session, TriggerSource::Proactive).await
    }

    /// The queue ran dry
    pub async fn on_queue_empty(&self, session: &dyn PlaybackSession) -> AutoplayOutcome {
        self.trigger(session, TriggerSource::Reactive).await
    }

    /// Run the decision routine unless debounced or already in flight
    pub async fn trigger(
        &self,
        session: &dyn PlaybackSession,
        source: TriggerSource,
    ) -> AutoplayOutcome {
        let session_id = session.session_id().to_string();

        if !session.autoplay_enabled() {
            return AutoplayOutcome::Skipped(SkipReason::Disabled);
        }

        let now_playing = session.now_playing();
        let admitted = self.with_state(&session_id, |state| {
            if state.phase != AutoplayPhase::Idle {
                return Err(SkipReason::InFlight);
            }
            let now = Instant::now();
            if let Some(last) = state.last_trigger_at {
                if now.duration_since(last) < self.debounce {
                    return Err(SkipReason::Debounced);
                }
            }
            state.last_trigger_at = Some(now);
            state.phase = AutoplayPhase::Deciding;
            Ok(decision_input(state, now_playing.as_ref()))
        });

        let input = match admitted {
            Ok(input) => input,
            Err(reason) => {
                debug!(
                    session_id = %session_id,
                    source = ?source,
                    reason = ?reason,
                    "Autoplay trigger dropped"
                );
                return AutoplayOutcome::Skipped(reason);
            }
        };

        let _guard = PhaseGuard {
            manager: self,
            session_id: session_id.clone(),
        };
        let decision_id = Uuid::new_v4();

        debug!(
            decision_id = %decision_id,
            session_id = %session_id,
            source = ?source,
            seed = ?input.seed.as_ref().map(|s| s.search_text()),
            "Autoplay decision started"
        );

        let Some((candidate, tier)) = self.decide(&session_id, &input).await else {
            warn!(
                decision_id = %decision_id,
                session_id = %session_id,
                "Autoplay found nothing to queue"
            );
            return AutoplayOutcome::Stalled;
        };

        if !session.autoplay_enabled() {
            // Session moved on while resolving
            return AutoplayOutcome::Skipped(SkipReason::Disabled);
        }

        let track = Track::new(candidate, Requester::Autoplay);
        if let Err(e) = session.enqueue(track.clone()).await {
            warn!(
                decision_id = %decision_id,
                session_id = %session_id,
                error = %e,
                "Autoplay enqueue failed"
            );
            return AutoplayOutcome::Stalled;
        }

        self.with_state(&session_id, |state| state.history.push(&track));

        info!(
            decision_id = %decision_id,
            session_id = %session_id,
            tier = ?tier,
            title = %track.title(),
            author = %track.author(),
            "Autoplay queued track"
        );

        AutoplayOutcome::Enqueued { track, tier }
    }

    async fn decide(
        &self,
        session_id: &str,
        input: &DecisionInput,
    ) -> Option<(Candidate, AutoplayTier)> {
        if let Some(seed) = &input.seed {
            if let Some(candidate) = self.from_recommendations(session_id, seed, input).await {
                return Some((candidate, AutoplayTier::Recommendation));
            }
            if let Some(candidate) = self.from_artist_popular(seed, input).await {
                return Some((candidate, AutoplayTier::ArtistPopular));
            }
        }

        self.from_generic_query()
            .await
            .map(|candidate| (candidate, AutoplayTier::Generic))
    }

    async fn from_recommendations(
        &self,
        session_id: &str,
        seed: &CanonicalTrackDescriptor,
        input: &DecisionInput,
    ) -> Option<Candidate> {
        let recommendations = self
            .recommendations
            .get_recommendations(
                seed,
                &input.history,
                RecommendationOptions {
                    count: self.recommendation_count,
                },
            )
            .await;

        let received = recommendations.len();
        let fresh: Vec<_> = recommendations
            .into_iter()
            .filter(|r| !input.suppressed.contains(&title_key(&r.title)))
            .collect();

        debug!(
            session_id = %session_id,
            received,
            after_suppression = fresh.len(),
            "Recommendations filtered"
        );

        self.set_phase(session_id, AutoplayPhase::Resolving);

        for recommendation in fresh.iter().take(MAX_RESOLUTION_ATTEMPTS) {
            if let Some(candidate) = self
                .resolver
                .resolve_canonical(&recommendation.to_canonical())
                .await
            {
                return Some(candidate);
            }
            debug!(
                session_id = %session_id,
                title = %recommendation.title,
                artist = %recommendation.artist,
                "Recommendation did not resolve"
            );
        }

        None
    }

    async fn from_artist_popular(
        &self,
        seed: &CanonicalTrackDescriptor,
        input: &DecisionInput,
    ) -> Option<Candidate> {
        let query = format!("{} popular", seed.artist);
        let candidates = self.resolver.gateway().search(&query, None).await.ok()?;

        let mut candidates = candidates.into_iter();
        let top = candidates.next()?;
        if !input.suppressed.contains(&title_key(&top.title)) {
            return Some(top);
        }
        Some(
            candidates
                .find(|c| !input.suppressed.contains(&title_key(&c.title)))
                .unwrap_or(top),
        )
    }

    async fn from_generic_query(&self) -> Option<Candidate> {
        let query = {
            let mut rng = self.rng();
            if self.generic_queries.is_empty() {
                return None;
            }
            let index = rng.gen_range(0..self.generic_queries.len());
            self.generic_queries[index].clone()
        };

        let mut candidates = self.resolver.gateway().search(&query, None).await.ok()?;
        if candidates.is_empty() {
            return None;
        }

        candidates.truncate(GENERIC_PICK_POOL);
        let index = self.rng().gen_range(0..candidates.len());
        debug!(query = %query, index, "Generic fallback pick");
        Some(candidates.swap_remove(index))
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to `bus` and handle its events until the bus closes
    pub fn spawn(
        self: Arc<Self>,
        bus: &EventBus,
        directory: Arc<dyn SessionDirectory>,
    ) -> JoinHandle<()> {
        let events = bus.subscribe();
        tokio::spawn(self.run(events, directory))
    }

    /// Event loop; each event is handled in its own task so one failing
    /// session cannot stop the others
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<PlaybackEvent>,
        directory: Arc<dyn SessionDirectory>,
    ) {
        info!("Autoplay manager started");

        loop {
            match events.recv().await {
                Ok(event) => {
                    let manager = Arc::clone(&self);
                    let directory = Arc::clone(&directory);
                    tokio::spawn(async move {
                        manager.handle_event(event, directory.as_ref()).await;
                    });
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Autoplay manager lagged behind playback events");
                }
                Err(RecvError::Closed) => {
                    info!("Playback event bus closed, autoplay manager stopping");
                    break;
                }
            }
        }
    }

    /// Dispatch one playback event
    pub async fn handle_event(
        &self,
        event: PlaybackEvent,
        directory: &dyn SessionDirectory,
    ) -> Option<AutoplayOutcome> {
        if let PlaybackEvent::SessionClosed { session_id, .. } = &event {
            self.forget_session(session_id);
            return None;
        }

        let Some(session) = directory.session(event.session_id()) else {
            debug!(session_id = %event.session_id(), "Event for unknown session");
            return None;
        };

        let outcome = match &event {
            PlaybackEvent::TrackStarted { track, .. } => {
                self.on_track_start(session.as_ref(), track).await
            }
            PlaybackEvent::QueueEmpty { .. } => self.on_queue_empty(session.as_ref()).await,
            PlaybackEvent::SessionClosed { .. } => return None,
        };
        Some(outcome)
    }
}

/// Seed and suppression set for a decision
fn decision_input(state: &SessionState, now_playing: Option<&Track>) -> DecisionInput {
    let current = now_playing.or(state.last_started.as_ref());
    let current_uri = current.map(|t| t.uri());

    let seed = current.map(|track| {
        CanonicalTrackDescriptor::new(clean_artist(track.author()), clean_title(track.title()))
            .with_duration_ms(track.duration_ms())
    });

    let history = state
        .history
        .recent(RECOMMENDATION_HISTORY, current_uri)
        .into_iter()
        .map(HistoryEntry::to_canonical)
        .collect();

    let mut suppressed: HashSet<String> = state
        .history
        .recent(SUPPRESSION_HISTORY, current_uri)
        .into_iter()
        .map(|e| e.key.clone())
        .collect();
    if let Some(track) = current {
        suppressed.insert(title_key(track.title()));
    }

    DecisionInput {
        seed,
        history,
        suppressed,
    }
}
