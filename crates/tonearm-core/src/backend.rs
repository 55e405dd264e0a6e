//! Collaborator interfaces
//!
//! The controller does not decode audio, look up stream URLs or touch the
//! disk. It drives a [`PlaybackSink`], asks a [`TrackResolver`] for URLs and
//! stores its snapshot in a [`StateCache`].

use std::collections::HashMap;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Mutex, PoisonError };

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::track::{ Track, TrackId };


/// Errors returned by a [`TrackResolver`].
#[derive( Debug, Error )]
pub enum ResolutionError {
    #[error( "Track unavailable: {0}" )]
    Unavailable( TrackId ),

    #[error( "Failed to resolve {id}: {reason}" )]
    Failed { id: TrackId, reason: String },
}


/// Errors from reading or writing the session cache.
#[derive( Debug, Error )]
pub enum PersistenceError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid session snapshot: {0}" )]
    Format( #[from] serde_json::Error ),

    #[error( "Cache backend error: {0}" )]
    Backend( String ),
}


/// The audio output device.
///
/// Calls are instructions with no return contract; implementations should
/// log their own failures. They are issued while the controller holds its
/// state lock, so they must return promptly and must not call back into
/// the controller.
pub trait PlaybackSink: Send + Sync {
    /// Loads a new source. Position is implementation-defined afterwards.
    fn set_source( &self, url: &str );

    /// Moves the playhead.
    fn set_position( &self, seconds: f64 );

    fn play( &self );

    fn pause( &self );

    /// Registers the channel the sink must signal when a track finishes on
    /// its own. Called once per [`initialize`](crate::PlaybackController::initialize).
    fn subscribe_ended( &self, notifier: EndedNotifier );
}


/// Handle a sink uses to report natural end of a track.
#[derive( Debug, Clone )]
pub struct EndedNotifier {
    tx: mpsc::UnboundedSender<()>,
}


impl EndedNotifier {
    /// Creates a notifier and the receiving end it signals.
    pub fn channel() -> ( Self, mpsc::UnboundedReceiver<()> ) {
        let ( tx, rx ) = mpsc::unbounded_channel();
        ( Self { tx }, rx )
    }


    /// Signals that the loaded track played to completion.
    ///
    /// @returns false if the controller is gone
    pub fn notify( &self ) -> bool {
        self.tx.send( () ).is_ok()
    }
}


/// Turns a track into a URL the sink can load.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve( &self, track: &Track ) -> Result<String, ResolutionError>;
}


/// String-keyed blob storage for the session snapshot.
#[async_trait]
pub trait StateCache: Send + Sync {
    async fn get( &self, key: &str ) -> Result<Option<String>, PersistenceError>;

    async fn set( &self, key: &str, value: String ) -> Result<(), PersistenceError>;
}


/// In-process [`StateCache`]. Keeps a count of writes, which makes debounce
/// behaviour observable.
#[derive( Debug, Default )]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}


impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }


    /// Creates a cache pre-populated with one entry.
    pub fn with_entry( key: impl Into<String>, value: impl Into<String> ) -> Self {
        let cache = Self::default();
        cache.lock().insert( key.into(), value.into() );
        cache
    }


    /// Number of successful `set` calls so far.
    pub fn write_count( &self ) -> usize {
        self.writes.load( Ordering::SeqCst )
    }


    /// Reads an entry without going through the async trait.
    pub fn peek( &self, key: &str ) -> Option<String> {
        self.lock().get( key ).cloned()
    }


    fn lock( &self ) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else( PoisonError::into_inner )
    }
}


#[async_trait]
impl StateCache for MemoryCache {
    async fn get( &self, key: &str ) -> Result<Option<String>, PersistenceError> {
        Ok( self.peek( key ) )
    }


    async fn set( &self, key: &str, value: String ) -> Result<(), PersistenceError> {
        self.lock().insert( key.to_string(), value );
        self.writes.fetch_add( 1, Ordering::SeqCst );
        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        assert!( cache.get( "k" ).await.unwrap().is_none() );

        cache.set( "k", "v1".into() ).await.unwrap();
        cache.set( "k", "v2".into() ).await.unwrap();

        assert_eq!( cache.get( "k" ).await.unwrap().as_deref(), Some( "v2" ) );
        assert_eq!( cache.write_count(), 2 );
    }


    #[tokio::test]
    async fn test_ended_notifier_delivers() {
        let ( notifier, mut rx ) = EndedNotifier::channel();
        assert!( notifier.notify() );
        assert_eq!( rx.recv().await, Some( () ) );

        drop( rx );
        assert!( !notifier.notify() );
    }
}
