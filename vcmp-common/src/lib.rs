//! # VCMP Common Library
//!
//! Shared code for the VCMP voice-playback services:
//! - Track and candidate value types exchanged between modules
//! - Playback lifecycle events (EventBus)
//! - Configuration loading
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod track;

pub use error::{Error, Result};
pub use track::{BackendKind, Candidate, CanonicalTrackDescriptor, Requester, Track};
