//! Session state and its persisted snapshot.

use serde::{ Deserialize, Serialize };

use crate::backend::PersistenceError;
use crate::history::History;
use crate::queue::Queue;
use crate::track::{ Track, TrackId };


/// Policy applied when a track finishes on its own.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
pub enum PlaybackMode {
    /// Repeat the current track.
    SingleLoop,

    /// Walk the queue in order and wrap around.
    #[default]
    ListLoop,

    /// Walk the queue in order and stop after the last entry.
    ListOrder,

    /// Pick unvisited tracks at random until the whole queue has played.
    Random,
}


impl PlaybackMode {
    /// Toggle order used when no explicit mode is requested.
    pub const CYCLE: [PlaybackMode; 4] = [
        PlaybackMode::SingleLoop,
        PlaybackMode::ListLoop,
        PlaybackMode::Random,
        PlaybackMode::ListOrder,
    ];


    /// Returns the mode after this one in [`PlaybackMode::CYCLE`].
    pub fn next( self ) -> Self {
        let index = Self::CYCLE.iter().position( |m| *m == self ).unwrap_or( 0 );
        Self::CYCLE[ ( index + 1 ) % Self::CYCLE.len() ]
    }


    /// Returns a short human-readable name.
    pub fn name( &self ) -> &'static str {
        match self {
            PlaybackMode::SingleLoop => "Single loop",
            PlaybackMode::ListLoop => "List loop",
            PlaybackMode::ListOrder => "List order",
            PlaybackMode::Random => "Random",
        }
    }
}


/// Whether the sink is currently rendering audio.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}


/// Controller state derived from status and presence of a current track.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlayerState {
    /// No current track.
    Empty,
    Stopped,
    Playing,
    Paused,
}


/// Everything the controller knows about the running session.
#[derive( Debug, Clone, Default )]
pub struct SessionState {
    /// Track loaded in the sink. Need not be queued.
    pub current: Option<Track>,
    pub queue: Queue,
    pub history: History,
    pub status: PlaybackStatus,
    pub mode: PlaybackMode,
}


impl SessionState {
    /// Restores a session from a persisted snapshot. Playback always
    /// resumes stopped.
    pub fn from_snapshot( snapshot: SessionSnapshot ) -> Self {
        Self {
            current: snapshot.current,
            queue: Queue::from_tracks( snapshot.queue ),
            history: History::from_ids( snapshot.history ),
            status: PlaybackStatus::Stopped,
            mode: snapshot.mode,
        }
    }


    /// Captures the persisted part of the session.
    pub fn snapshot( &self ) -> SessionSnapshot {
        SessionSnapshot {
            queue: self.queue.tracks().to_vec(),
            mode: self.mode,
            current: self.current.clone(),
            history: self.history.ids().to_vec(),
        }
    }


    pub fn state( &self ) -> PlayerState {
        match ( &self.current, self.status ) {
            ( None, _ ) => PlayerState::Empty,
            ( Some( _ ), PlaybackStatus::Stopped ) => PlayerState::Stopped,
            ( Some( _ ), PlaybackStatus::Playing ) => PlayerState::Playing,
            ( Some( _ ), PlaybackStatus::Paused ) => PlayerState::Paused,
        }
    }


    pub fn current_id( &self ) -> Option<&str> {
        self.current.as_ref().map( |t| t.id.as_str() )
    }
}


/// Persisted session shape, stored as JSON under a single cache key.
#[derive( Debug, Clone, Default, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct SessionSnapshot {
    pub queue: Vec<Track>,
    pub mode: PlaybackMode,
    pub current: Option<Track>,
    pub history: Vec<TrackId>,
}


impl SessionSnapshot {
    pub fn encode( &self ) -> Result<String, PersistenceError> {
        Ok( serde_json::to_string( self )? )
    }


    pub fn decode( raw: &str ) -> Result<Self, PersistenceError> {
        Ok( serde_json::from_str( raw )? )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_mode_cycle() {
        assert_eq!( PlaybackMode::SingleLoop.next(), PlaybackMode::ListLoop );
        assert_eq!( PlaybackMode::ListLoop.next(), PlaybackMode::Random );
        assert_eq!( PlaybackMode::Random.next(), PlaybackMode::ListOrder );
        assert_eq!( PlaybackMode::ListOrder.next(), PlaybackMode::SingleLoop );
    }


    #[test]
    fn test_state_derivation() {
        let mut session = SessionState::default();
        assert_eq!( session.state(), PlayerState::Empty );

        session.current = Some( Track::new( "a", "A", 1.0 ) );
        assert_eq!( session.state(), PlayerState::Stopped );

        session.status = PlaybackStatus::Paused;
        assert_eq!( session.state(), PlayerState::Paused );
    }


    #[test]
    fn test_snapshot_round_trip() {
        let mut session = SessionState::default();
        session.queue.enqueue( [ Track::new( "a", "A", 1.0 ), Track::new( "b", "B", 2.0 ) ] );
        session.history.push( "a" );
        session.history.push( "b" );
        session.current = Some( Track::new( "b", "B", 2.0 ) );
        session.status = PlaybackStatus::Playing;
        session.mode = PlaybackMode::Random;

        let raw = session.snapshot().encode().unwrap();
        let restored = SessionState::from_snapshot( SessionSnapshot::decode( &raw ).unwrap() );

        assert_eq!( restored.queue, session.queue );
        assert_eq!( restored.history, session.history );
        assert_eq!( restored.current_id(), Some( "b" ) );
        assert_eq!( restored.mode, PlaybackMode::Random );
        assert_eq!( restored.status, PlaybackStatus::Stopped );
    }


    #[test]
    fn test_snapshot_wire_shape() {
        let raw = r#"{
            "queue": [ { "id": 7, "name": "Seven", "duration": 70 } ],
            "mode": "ListOrder",
            "current": { "id": "7", "name": "Seven", "duration": 70 },
            "history": [ "7" ]
        }"#;
        let snapshot = SessionSnapshot::decode( raw ).unwrap();

        assert_eq!( snapshot.queue[ 0 ].id, "7" );
        assert_eq!( snapshot.mode, PlaybackMode::ListOrder );
        assert_eq!( snapshot.history, vec![ "7" ] );
    }


    #[test]
    fn test_partial_snapshot_uses_defaults() {
        let snapshot = SessionSnapshot::decode( r#"{ "history": [ "x" ] }"# ).unwrap();

        assert!( snapshot.queue.is_empty() );
        assert!( snapshot.current.is_none() );
        assert_eq!( snapshot.mode, PlaybackMode::ListLoop );
    }


    #[test]
    fn test_corrupt_snapshot_is_error() {
        assert!( SessionSnapshot::decode( "not json" ).is_err() );
        assert!( SessionSnapshot::decode( "" ).is_err() );
    }
}
