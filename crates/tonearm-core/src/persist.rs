//! Debounced session persistence
//!
//! Every state change hands the latest snapshot to [`Persister::schedule`].
//! The write happens once the session has been quiet for the configured
//! delay; a newer snapshot aborts the pending write and starts the timer
//! again.

use std::sync::{ Arc, Mutex, PoisonError };
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::backend::{ PersistenceError, StateCache };
use crate::session::SessionSnapshot;


/// Owns the pending write task for one cache key.
pub struct Persister {
    cache: Arc<dyn StateCache>,
    key: String,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}


impl Persister {
    pub fn new( cache: Arc<dyn StateCache>, key: impl Into<String>, delay: Duration ) -> Self {
        Self {
            cache,
            key: key.into(),
            delay,
            pending: Mutex::new( None ),
        }
    }


    /// Reads and decodes the stored snapshot.
    ///
    /// @returns `Ok(None)` if nothing has been stored yet
    pub async fn load( &self ) -> Result<Option<SessionSnapshot>, PersistenceError> {
        match self.cache.get( &self.key ).await? {
            Some( raw ) => SessionSnapshot::decode( &raw ).map( Some ),
            None => Ok( None ),
        }
    }


    /// Replaces any pending write with one for `snapshot`.
    ///
    /// Needs a tokio runtime; outside one the write is skipped and logged.
    pub fn schedule( &self, snapshot: SessionSnapshot ) {
        let runtime = match Handle::try_current() {
            Ok( handle ) => handle,
            Err( e ) => {
                tracing::warn!( "Session not persisted, no runtime: {}", e );
                return;
            }
        };

        let cache = Arc::clone( &self.cache );
        let key = self.key.clone();
        let delay = self.delay;

        let mut pending = self.lock_pending();
        if let Some( previous ) = pending.take() {
            previous.abort();
        }

        tracing::debug!( "Session write scheduled in {:?}", delay );
        *pending = Some( runtime.spawn( async move {
            tokio::time::sleep( delay ).await;
            match write( cache.as_ref(), &key, &snapshot ).await {
                Ok(()) => tracing::debug!( "Session saved under {}", key ),
                Err( e ) => tracing::warn!( "Failed to save session: {}", e ),
            }
        }));
    }


    /// Cancels any pending write and stores `snapshot` immediately.
    pub async fn flush( &self, snapshot: &SessionSnapshot ) -> Result<(), PersistenceError> {
        self.cancel();
        write( self.cache.as_ref(), &self.key, snapshot ).await
    }


    /// Drops the pending write, if any.
    pub fn cancel( &self ) {
        if let Some( previous ) = self.lock_pending().take() {
            previous.abort();
        }
    }


    /// Returns true while a write is waiting for its quiet period.
    pub fn is_pending( &self ) -> bool {
        self.lock_pending()
            .as_ref()
            .map( |handle| !handle.is_finished() )
            .unwrap_or( false )
    }


    pub fn key( &self ) -> &str {
        &self.key
    }


    fn lock_pending( &self ) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else( PoisonError::into_inner )
    }
}


async fn write(
    cache: &dyn StateCache,
    key: &str,
    snapshot: &SessionSnapshot,
) -> Result<(), PersistenceError> {
    let raw = snapshot.encode()?;
    cache.set( key, raw ).await
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::backend::MemoryCache;
    use crate::session::PlaybackMode;


    fn snapshot( mode: PlaybackMode ) -> SessionSnapshot {
        SessionSnapshot { mode, ..Default::default() }
    }


    #[tokio::test( start_paused = true )]
    async fn test_rapid_changes_write_once() {
        let cache = Arc::new( MemoryCache::new() );
        let persister = Persister::new( cache.clone(), "session", Duration::from_millis( 200 ) );

        persister.schedule( snapshot( PlaybackMode::SingleLoop ) );
        tokio::time::sleep( Duration::from_millis( 50 ) ).await;
        persister.schedule( snapshot( PlaybackMode::Random ) );
        tokio::time::sleep( Duration::from_millis( 150 ) ).await;
        persister.schedule( snapshot( PlaybackMode::ListOrder ) );

        assert_eq!( cache.write_count(), 0 );
        assert!( persister.is_pending() );

        tokio::time::sleep( Duration::from_millis( 250 ) ).await;

        assert_eq!( cache.write_count(), 1 );
        let stored = persister.load().await.unwrap().unwrap();
        assert_eq!( stored.mode, PlaybackMode::ListOrder );
    }


    #[tokio::test( start_paused = true )]
    async fn test_flush_cancels_pending() {
        let cache = Arc::new( MemoryCache::new() );
        let persister = Persister::new( cache.clone(), "session", Duration::from_millis( 200 ) );

        persister.schedule( snapshot( PlaybackMode::Random ) );
        persister.flush( &snapshot( PlaybackMode::SingleLoop ) ).await.unwrap();
        tokio::time::sleep( Duration::from_secs( 1 ) ).await;

        assert_eq!( cache.write_count(), 1 );
        assert_eq!( persister.load().await.unwrap().unwrap().mode, PlaybackMode::SingleLoop );
    }


    #[tokio::test]
    async fn test_load_missing_and_corrupt() {
        let empty = Persister::new( Arc::new( MemoryCache::new() ), "k", Duration::ZERO );
        assert!( empty.load().await.unwrap().is_none() );

        let corrupt = Persister::new(
            Arc::new( MemoryCache::with_entry( "k", "{ not json" ) ),
            "k",
            Duration::ZERO,
        );
        assert!( matches!( corrupt.load().await, Err( PersistenceError::Format( _ ) ) ) );
    }
}
