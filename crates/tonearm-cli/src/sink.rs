//! Simulated output device
//!
//! [`ClockSink`] keeps a playhead against the tokio clock instead of driving
//! real audio hardware. When a loaded track reaches its length the sink
//! reports a natural end, exactly as a device callback would.

use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tonearm_core::{ EndedNotifier, PlaybackSink };

use crate::resolver::SourceLengths;


#[derive( Default )]
struct Clock {
    source: Option<String>,
    length: Option<Duration>,
    /// Playhead at the moment `started` was taken
    offset: Duration,
    started: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}


impl Clock {
    fn position( &self ) -> Duration {
        let position = self.offset + self.started.map( |s| s.elapsed() ).unwrap_or_default();
        match self.length {
            Some( length ) => position.min( length ),
            None => position,
        }
    }


    /// Folds running time into `offset` and stops the clock.
    fn hold( &mut self ) {
        self.disarm();
        self.offset = self.position();
        self.started = None;
    }


    fn finished( &self ) -> bool {
        self.length.map_or( false, |length| self.offset >= length )
    }


    fn disarm( &mut self ) {
        if let Some( timer ) = self.timer.take() {
            timer.abort();
        }
    }
}


/// Output device that plays silence in real time.
pub struct ClockSink {
    fallback: Option<Duration>,
    lengths: Arc<SourceLengths>,
    clock: Mutex<Clock>,
    ended: Mutex<Option<EndedNotifier>>,
}


impl ClockSink {
    /// Creates a sink. Source lengths are looked up in `lengths`;
    /// `fallback` is used for sources not listed there, and without one
    /// those sources play until paused.
    pub fn new( fallback: Option<Duration>, lengths: Arc<SourceLengths> ) -> Self {
        Self {
            fallback,
            lengths,
            clock: Mutex::new( Clock::default() ),
            ended: Mutex::new( None ),
        }
    }


    /// Current playhead in seconds.
    pub fn position( &self ) -> f64 {
        self.lock_clock().position().as_secs_f64()
    }


    pub fn is_playing( &self ) -> bool {
        self.lock_clock().started.is_some()
    }


    pub fn source( &self ) -> Option<String> {
        self.lock_clock().source.clone()
    }


    /// Restarts the end-of-track timer from the current playhead.
    fn arm( &self, clock: &mut Clock ) {
        clock.disarm();

        let Some( length ) = clock.length else { return };
        let Some( notifier ) = self.lock_ended().clone() else { return };
        let runtime = match Handle::try_current() {
            Ok( handle ) => handle,
            Err( e ) => {
                tracing::warn!( "End-of-track timer not started: {}", e );
                return;
            }
        };

        let remaining = length.saturating_sub( clock.offset );
        clock.timer = Some( runtime.spawn( async move {
            tokio::time::sleep( remaining ).await;
            tracing::debug!( "Source finished" );
            if !notifier.notify() {
                tracing::debug!( "Nobody listening for track end" );
            }
        }));
    }


    fn lock_clock( &self ) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else( PoisonError::into_inner )
    }


    fn lock_ended( &self ) -> MutexGuard<'_, Option<EndedNotifier>> {
        self.ended.lock().unwrap_or_else( PoisonError::into_inner )
    }
}


impl PlaybackSink for ClockSink {
    /// Loading the source that is already loaded keeps the playhead.
    fn set_source( &self, url: &str ) {
        let mut clock = self.lock_clock();
        clock.hold();

        if clock.source.as_deref() == Some( url ) {
            tracing::debug!( "Reloaded {} at {:?}", url, clock.offset );
            return;
        }

        clock.length = self.lengths.get( url ).or( self.fallback );
        clock.source = Some( url.to_string() );
        clock.offset = Duration::ZERO;
        tracing::info!( "Loaded {} ({:?})", url, clock.length );
    }


    fn set_position( &self, seconds: f64 ) {
        let mut clock = self.lock_clock();
        clock.offset = Duration::from_secs_f64( seconds.max( 0.0 ) );
        if clock.started.is_some() {
            clock.started = Some( Instant::now() );
            self.arm( &mut clock );
        }
    }


    fn play( &self ) {
        let mut clock = self.lock_clock();
        if clock.source.is_none() {
            tracing::warn!( "Play requested with no source loaded" );
            return;
        }
        if clock.started.is_none() {
            // A finished source starts over
            if clock.finished() {
                clock.offset = Duration::ZERO;
            }
            clock.started = Some( Instant::now() );
            self.arm( &mut clock );
        }
    }


    fn pause( &self ) {
        self.lock_clock().hold();
    }


    fn subscribe_ended( &self, notifier: EndedNotifier ) {
        *self.lock_ended() = Some( notifier );
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    const STREAM: &str = "https://radio.example/a";


    fn sink( fallback_secs: Option<u64> ) -> ( ClockSink, tokio::sync::mpsc::UnboundedReceiver<()> ) {
        let sink = ClockSink::new( fallback_secs.map( Duration::from_secs ), Arc::default() );
        let ( notifier, rx ) = EndedNotifier::channel();
        sink.subscribe_ended( notifier );
        ( sink, rx )
    }


    #[tokio::test( start_paused = true )]
    async fn test_reports_end_after_length() {
        let ( sink, mut rx ) = sink( Some( 3 ) );

        sink.set_source( STREAM );
        sink.play();
        tokio::time::sleep( Duration::from_secs( 1 ) ).await;
        sink.pause();

        assert!( !sink.is_playing() );
        assert!( ( sink.position() - 1.0 ).abs() < 0.01 );

        tokio::time::sleep( Duration::from_secs( 10 ) ).await;
        assert!( rx.try_recv().is_err() );

        sink.play();
        tokio::time::sleep( Duration::from_millis( 2100 ) ).await;
        assert_eq!( rx.try_recv(), Ok( () ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_reloading_same_source_keeps_playhead() {
        let ( sink, mut rx ) = sink( Some( 100 ) );

        sink.set_source( STREAM );
        sink.play();
        tokio::time::sleep( Duration::from_secs( 30 ) ).await;
        sink.pause();

        sink.set_source( STREAM );
        sink.play();
        assert!( ( sink.position() - 30.0 ).abs() < 0.01 );

        tokio::time::sleep( Duration::from_secs( 69 ) ).await;
        assert!( rx.try_recv().is_err() );
        tokio::time::sleep( Duration::from_secs( 2 ) ).await;
        assert_eq!( rx.try_recv(), Ok( () ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_new_source_starts_at_zero() {
        let ( sink, _rx ) = sink( Some( 100 ) );

        sink.set_source( STREAM );
        sink.play();
        tokio::time::sleep( Duration::from_secs( 30 ) ).await;
        sink.set_source( "https://radio.example/b" );
        sink.play();

        assert_eq!( sink.position(), 0.0 );
        assert_eq!( sink.source().as_deref(), Some( "https://radio.example/b" ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_finished_source_restarts_on_play() {
        let ( sink, mut rx ) = sink( Some( 5 ) );

        sink.set_source( STREAM );
        sink.play();
        tokio::time::sleep( Duration::from_secs( 6 ) ).await;
        assert_eq!( rx.try_recv(), Ok( () ) );

        sink.set_source( STREAM );
        sink.play();

        assert_eq!( sink.position(), 0.0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_seek_restarts_timer() {
        let ( sink, mut rx ) = sink( Some( 5 ) );

        sink.set_source( STREAM );
        sink.play();
        tokio::time::sleep( Duration::from_secs( 4 ) ).await;
        sink.set_position( 0.0 );
        tokio::time::sleep( Duration::from_secs( 4 ) ).await;

        assert!( rx.try_recv().is_err() );

        tokio::time::sleep( Duration::from_secs( 2 ) ).await;
        assert_eq!( rx.try_recv(), Ok( () ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_length_comes_from_resolved_tracks() {
        let lengths = Arc::new( SourceLengths::default() );
        lengths.record( "file:///music/a.flac", 2.0 );
        let sink = ClockSink::new( None, lengths );
        let ( notifier, mut rx ) = EndedNotifier::channel();
        sink.subscribe_ended( notifier );

        sink.set_source( "file:///music/a.flac" );
        sink.play();
        tokio::time::sleep( Duration::from_millis( 2100 ) ).await;

        assert_eq!( rx.try_recv(), Ok( () ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_unknown_length_never_ends() {
        let ( sink, mut rx ) = sink( None );

        sink.set_source( "https://radio.example/live" );
        sink.play();
        tokio::time::sleep( Duration::from_secs( 3600 ) ).await;

        assert!( rx.try_recv().is_err() );
        assert_eq!( sink.source().as_deref(), Some( "https://radio.example/live" ) );
    }


    #[test]
    fn test_play_without_source_is_ignored() {
        let ( sink, _rx ) = sink( None );
        sink.play();
        assert!( !sink.is_playing() );
    }
}
