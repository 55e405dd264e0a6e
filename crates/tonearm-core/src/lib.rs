//! Tonearm Core - Playback session controller
//!
//! This crate owns the play queue, history, playback mode and status, and
//! drives an external audio sink. URL resolution and snapshot storage are
//! delegated to caller-supplied collaborators.

pub mod backend;
pub mod command;
pub mod controller;
pub mod history;
pub mod persist;
pub mod queue;
pub mod session;
pub mod track;

pub use backend::{
    EndedNotifier, MemoryCache, PersistenceError, PlaybackSink, ResolutionError, StateCache,
    TrackResolver,
};
pub use command::{ Command, CommandError };
pub use controller::{ ControllerConfig, ControllerError, PlayOutcome, PlaybackController };
pub use history::History;
pub use queue::{ InsertNext, Queue };
pub use session::{ PlaybackMode, PlaybackStatus, PlayerState, SessionSnapshot, SessionState };
pub use track::{ Track, TrackId };
