//! Playback lifecycle events
//!
//! The playback layer emits these on an [`EventBus`]; the autoplay manager
//! subscribes to them.

use crate::track::Track;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// A track started playing on a session
    ///
    /// Triggers:
    /// - Autoplay: record history, proactive continuation when the queue is short
    TrackStarted {
        /// Playback session (one per voice connection)
        session_id: String,
        /// Track that started
        track: Track,
        /// When the track started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The session's queue ran dry
    ///
    /// Triggers:
    /// - Autoplay: reactive continuation
    QueueEmpty {
        session_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The session was destroyed (left voice, stopped)
    SessionClosed {
        session_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlaybackEvent {
    pub fn track_started(session_id: impl Into<String>, track: Track) -> Self {
        PlaybackEvent::TrackStarted {
            session_id: session_id.into(),
            track,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn queue_empty(session_id: impl Into<String>) -> Self {
        PlaybackEvent::QueueEmpty {
            session_id: session_id.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn session_closed(session_id: impl Into<String>) -> Self {
        PlaybackEvent::SessionClosed {
            session_id: session_id.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            PlaybackEvent::TrackStarted { session_id, .. }
            | PlaybackEvent::QueueEmpty { session_id, .. }
            | PlaybackEvent::SessionClosed { session_id, .. } => session_id,
        }
    }
}

/// Broadcast bus for playback events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlaybackEvent,
    ) -> Result<usize, broadcast::error::SendError<PlaybackEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlaybackEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{BackendKind, Candidate, Requester};

    fn sample_track() -> Track {
        Track::new(
            Candidate {
                title: "Song".to_string(),
                author: "Artist".to_string(),
                uri: "https://soundcloud.com/artist/song".to_string(),
                duration_ms: 180_000,
                backend: BackendKind::SoundCloud,
                thumbnail: None,
                encoded: None,
            },
            Requester::User("42".to_string()),
        )
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(PlaybackEvent::track_started("guild-1", sample_track()))
            .unwrap();
        bus.emit(PlaybackEvent::queue_empty("guild-1")).unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, PlaybackEvent::TrackStarted { .. }));
        assert_eq!(first.session_id(), "guild-1");

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, PlaybackEvent::QueueEmpty { .. }));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(PlaybackEvent::queue_empty("g")).is_err());
        bus.emit_lossy(PlaybackEvent::session_closed("g"));
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(PlaybackEvent::queue_empty("g")).unwrap();
        assert_eq!(json["type"], "QueueEmpty");
        assert_eq!(json["session_id"], "g");
    }
}
