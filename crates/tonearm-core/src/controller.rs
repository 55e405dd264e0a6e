//! Playback controller
//!
//! Owns the session state and turns UI commands into sink instructions.
//!
//! Commands that need a stream URL run in three steps: a plan is computed
//! under the state lock, the resolver is awaited with the lock released,
//! and the result is committed under the lock in one step. Each plan that
//! can change the current track or status takes a fresh generation number;
//! a commit whose generation is no longer the latest is dropped, so a slow
//! resolution can never overwrite the outcome of a newer command.

use std::sync::{ Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak };
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{ EndedNotifier, PlaybackSink, ResolutionError, StateCache, TrackResolver };
use crate::persist::Persister;
use crate::queue::InsertNext;
use crate::session::{
    PlaybackMode, PlaybackStatus, PlayerState, SessionSnapshot, SessionState,
};
use crate::track::{ Track, TrackId };


/// Cache key the session snapshot is stored under by default.
pub const DEFAULT_STATE_KEY: &str = "tonearm.session";

/// Quiet period before a state change is written to the cache.
pub const DEFAULT_PERSIST_DELAY: Duration = Duration::from_millis( 200 );


/// Errors returned by playback commands.
#[derive( Debug, Error )]
pub enum ControllerError {
    #[error( transparent )]
    Resolution( #[from] ResolutionError ),
}


/// What a playback command ended up doing.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum PlayOutcome {
    /// A track was loaded and started from the beginning.
    Started( TrackId ),

    /// The current track was reloaded and resumed.
    Resumed( TrackId ),

    /// Playback was paused.
    Paused,

    /// The end of a non-looping list was reached.
    Stopped,

    /// Nothing to do.
    Unchanged,

    /// A newer command took over while this one was resolving.
    Superseded,
}


/// Controller settings.
#[derive( Debug, Clone )]
pub struct ControllerConfig {
    /// Cache key for the session snapshot.
    pub state_key: String,

    /// Debounce interval for snapshot writes.
    pub persist_delay: Duration,

    /// Fixed seed for random mode. `None` seeds from the OS.
    pub shuffle_seed: Option<u64>,
}


impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            state_key: DEFAULT_STATE_KEY.to_string(),
            persist_delay: DEFAULT_PERSIST_DELAY,
            shuffle_seed: None,
        }
    }
}


/// How a resolved track is handed to the sink.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
enum StartKind {
    /// New current track: queue it if needed, seek to 0.
    Switch,

    /// Same track again: reload and continue from the sink's position.
    Resume,

    /// Same track again from the beginning.
    Replay,
}


#[derive( Debug )]
struct StartRequest {
    track: Track,
    kind: StartKind,
    generation: u64,
    record_history: bool,
    reset_history: bool,
}


#[derive( Debug )]
enum Plan {
    Done( PlayOutcome ),
    Start( StartRequest ),
}


/// Session state plus the generation counter that orders commands.
#[derive( Debug, Default )]
struct Core {
    session: SessionState,
    generation: u64,
}


impl Core {
    fn next_generation( &mut self ) -> u64 {
        self.generation += 1;
        self.generation
    }


    fn request( &mut self, track: Track, kind: StartKind ) -> Plan {
        Plan::Start( StartRequest {
            track,
            kind,
            generation: self.next_generation(),
            record_history: true,
            reset_history: false,
        })
    }
}


struct Shared {
    core: RwLock<Core>,
    sink: Arc<dyn PlaybackSink>,
    resolver: Arc<dyn TrackResolver>,
    persister: Persister,
    rng: Mutex<StdRng>,
    pump: Mutex<Option<JoinHandle<()>>>,
}


/// Handle to a playback session. Clones share the same session.
#[derive( Clone )]
pub struct PlaybackController {
    shared: Arc<Shared>,
}


impl PlaybackController {
    /// Creates a controller with an empty session. Call
    /// [`initialize`](Self::initialize) before issuing commands.
    pub fn new(
        sink: Arc<dyn PlaybackSink>,
        resolver: Arc<dyn TrackResolver>,
        cache: Arc<dyn StateCache>,
        config: ControllerConfig,
    ) -> Self {
        let rng = match config.shuffle_seed {
            Some( seed ) => StdRng::seed_from_u64( seed ),
            None => StdRng::from_entropy(),
        };

        Self {
            shared: Arc::new( Shared {
                core: RwLock::new( Core::default() ),
                sink,
                resolver,
                persister: Persister::new( cache, config.state_key, config.persist_delay ),
                rng: Mutex::new( rng ),
                pump: Mutex::new( None ),
            }),
        }
    }


    /// Restores the session from the cache and attaches to the sink.
    ///
    /// A missing or unreadable snapshot yields an empty session. If a
    /// current track was restored its source is loaded into the sink
    /// without starting playback.
    pub async fn initialize( &self ) -> PlayerState {
        let session = match self.shared.persister.load().await {
            Ok( Some( snapshot ) ) => {
                tracing::info!(
                    "Restored session: {} queued, {} in history, mode {:?}",
                    snapshot.queue.len(),
                    snapshot.history.len(),
                    snapshot.mode
                );
                SessionState::from_snapshot( snapshot )
            }
            Ok( None ) => {
                tracing::info!( "No saved session, starting empty" );
                SessionState::default()
            }
            Err( e ) => {
                tracing::warn!( "Discarding unreadable session: {}", e );
                SessionState::default()
            }
        };

        self.attach_sink();

        let ( current, generation ) = {
            let mut core = self.write();
            core.session = session;
            let generation = core.next_generation();
            ( core.session.current.clone(), generation )
        };

        if let Some( track ) = current {
            match self.shared.resolver.resolve( &track ).await {
                Ok( url ) => {
                    let core = self.write();
                    if core.generation == generation {
                        self.shared.sink.set_source( &url );
                        tracing::info!( "Loaded {} ({})", track.name, track.id );
                    }
                }
                Err( e ) => tracing::warn!( "Could not preload {}: {}", track.id, e ),
            }
        }

        self.state()
    }


    /// Plays `track`, or toggles the current track when `track` is `None`
    /// or is already current.
    ///
    /// | state                       | `track` differs from current | otherwise  |
    /// |-----------------------------|------------------------------|------------|
    /// | Playing                     | switch, start from 0         | pause      |
    /// | Paused / Stopped            | switch, start from 0         | resume     |
    /// | Empty, queue not empty      | switch, start from 0         | resume head|
    /// | Empty, queue empty          | switch, start from 0         | no-op      |
    ///
    /// Callers should inspect the outcome: the same call may start, resume
    /// or pause playback.
    pub async fn play( &self, track: Option<Track> ) -> Result<PlayOutcome, ControllerError> {
        let plan = {
            let mut core = self.write();
            let current = core.session.current.clone()
                .or_else( || core.session.queue.first().cloned() );

            match ( track, current ) {
                ( Some( track ), current ) if current.as_ref().map_or( true, |c| !c.same_as( &track ) ) => {
                    core.request( track, StartKind::Switch )
                }
                ( _, Some( current ) ) => match core.session.status {
                    PlaybackStatus::Playing => {
                        self.pause_locked( &mut core );
                        Plan::Done( PlayOutcome::Paused )
                    }
                    PlaybackStatus::Paused | PlaybackStatus::Stopped => {
                        core.request( current, StartKind::Resume )
                    }
                },
                ( _, None ) => Plan::Done( PlayOutcome::Unchanged ),
            }
        };

        self.run( plan ).await
    }


    /// Pauses playback. A start that is still resolving is abandoned.
    pub fn pause( &self ) -> PlayOutcome {
        let outcome = {
            let mut core = self.write();
            if core.session.status == PlaybackStatus::Playing {
                self.pause_locked( &mut core );
                PlayOutcome::Paused
            } else {
                core.next_generation();
                PlayOutcome::Unchanged
            }
        };

        if outcome == PlayOutcome::Paused {
            self.persist();
        }
        outcome
    }


    /// Moves forward one track.
    ///
    /// Random mode picks the same way a natural track end does. Other modes
    /// take the next queue entry; only list loop wraps at the end.
    pub async fn skip_next( &self ) -> Result<PlayOutcome, ControllerError> {
        let plan = {
            let mut core = self.write();
            match core.session.current.clone() {
                None => Plan::Done( PlayOutcome::Unchanged ),
                Some( current ) => match core.session.mode {
                    PlaybackMode::Random => self.plan_random( &mut core ),
                    mode => {
                        let wrap = mode == PlaybackMode::ListLoop;
                        match core.session.queue.successor( &current.id, wrap ).cloned() {
                            Some( next ) => core.request( next, StartKind::Switch ),
                            None => Plan::Done( PlayOutcome::Unchanged ),
                        }
                    }
                },
            }
        };

        self.run( plan ).await
    }


    /// Goes back to the track played before the current one.
    ///
    /// Going back does not rewrite history, so repeated calls keep walking
    /// towards the oldest entry. No predecessor, or a predecessor that has
    /// left the queue, is a no-op.
    pub async fn skip_previous( &self ) -> Result<PlayOutcome, ControllerError> {
        let plan = {
            let mut core = self.write();
            let previous = core.session.current_id()
                .and_then( |id| core.session.history.predecessor( id ) )
                .and_then( |id| core.session.queue.find( id ) )
                .cloned();

            match previous {
                Some( track ) => match core.request( track, StartKind::Switch ) {
                    Plan::Start( mut request ) => {
                        request.record_history = false;
                        Plan::Start( request )
                    }
                    done => done,
                },
                None => Plan::Done( PlayOutcome::Unchanged ),
            }
        };

        self.run( plan ).await
    }


    /// Applies the end-of-track policy. Invoked by the sink pump; may also
    /// be called directly.
    ///
    /// The session only changes once the follow-up track is resolved and
    /// committed. If resolution fails, status and current are left as they
    /// were.
    pub async fn on_track_ended( &self ) -> Result<PlayOutcome, ControllerError> {
        let plan = {
            let mut core = self.write();
            match core.session.current.clone() {
                None => Plan::Done( PlayOutcome::Unchanged ),
                Some( current ) => {
                    tracing::debug!( "Track ended: {}", current.id );

                    match core.session.mode {
                        PlaybackMode::Random => self.plan_random( &mut core ),
                        PlaybackMode::SingleLoop => core.request( current, StartKind::Replay ),
                        mode => {
                            let wrap = mode == PlaybackMode::ListLoop;
                            match core.session.queue.successor( &current.id, wrap ).cloned() {
                                Some( next ) => core.request( next, StartKind::Switch ),
                                None => {
                                    core.next_generation();
                                    core.session.status = PlaybackStatus::Stopped;
                                    tracing::info!( "End of list reached" );
                                    Plan::Done( PlayOutcome::Stopped )
                                }
                            }
                        }
                    }
                }
            }
        };

        let persist_now = matches!( plan, Plan::Done( PlayOutcome::Stopped ) );
        let outcome = self.run( plan ).await;
        if persist_now {
            self.persist();
        }
        outcome
    }


    /// Appends tracks to the queue, moving any already queued.
    pub fn enqueue( &self, tracks: impl IntoIterator<Item = Track> ) -> usize {
        let added = self.write().session.queue.enqueue( tracks );
        tracing::debug!( "Enqueued {} track(s)", added );
        self.persist();
        added
    }


    /// Removes tracks from the queue and from history. The current track is
    /// left as it is even if it was removed.
    pub fn dequeue<S: AsRef<str>>( &self, ids: &[S] ) -> usize {
        let removed = {
            let mut core = self.write();
            core.session.history.remove( ids );
            core.session.queue.remove( ids )
        };
        tracing::debug!( "Dequeued {} track(s)", removed );
        self.persist();
        removed
    }


    /// Empties the queue and history.
    pub fn clear_queue( &self ) {
        {
            let mut core = self.write();
            core.session.queue.clear();
            core.session.history.clear();
        }
        tracing::debug!( "Queue cleared" );
        self.persist();
    }


    /// Sets the playback mode, or advances through
    /// [`PlaybackMode::CYCLE`] when `mode` is `None`.
    pub fn set_mode( &self, mode: Option<PlaybackMode> ) -> PlaybackMode {
        let mode = {
            let mut core = self.write();
            let mode = mode.unwrap_or_else( || core.session.mode.next() );
            core.session.mode = mode;
            mode
        };
        tracing::info!( "Playback mode: {:?}", mode );
        self.persist();
        mode
    }


    /// Queues `track` to play right after the current one.
    ///
    /// When the current track is first in the queue the track is only
    /// taken out of its old position, see [`InsertNext::CurrentAtHead`].
    pub fn insert_next( &self, track: Track ) -> InsertNext {
        let result = {
            let mut core = self.write();
            let session = &mut core.session;
            match session.current.as_ref().map( |c| c.id.clone() ) {
                Some( current ) => session.queue.insert_next( track, &current ),
                None => InsertNext::CurrentMissing,
            }
        };

        tracing::debug!( "Insert next: {:?}", result );
        if result != InsertNext::CurrentMissing {
            self.persist();
        }
        result
    }


    /// Stops the sink pump and writes the session immediately.
    pub async fn shutdown( &self ) {
        if let Some( pump ) = self.lock_pump().take() {
            pump.abort();
        }

        let snapshot = self.snapshot();
        match self.shared.persister.flush( &snapshot ).await {
            Ok(()) => tracing::info!( "Session saved" ),
            Err( e ) => tracing::warn!( "Failed to save session on shutdown: {}", e ),
        }
    }


    /// Consistent copy of the whole session.
    pub fn session( &self ) -> SessionState {
        self.read().session.clone()
    }


    /// The persisted part of the session.
    pub fn snapshot( &self ) -> SessionSnapshot {
        self.read().session.snapshot()
    }


    pub fn state( &self ) -> PlayerState {
        self.read().session.state()
    }


    pub fn current( &self ) -> Option<Track> {
        self.read().session.current.clone()
    }


    pub fn status( &self ) -> PlaybackStatus {
        self.read().session.status
    }


    pub fn mode( &self ) -> PlaybackMode {
        self.read().session.mode
    }


    pub fn queue( &self ) -> Vec<Track> {
        self.read().session.queue.tracks().to_vec()
    }


    pub fn history( &self ) -> Vec<TrackId> {
        self.read().session.history.ids().to_vec()
    }


    async fn run( &self, plan: Plan ) -> Result<PlayOutcome, ControllerError> {
        match plan {
            Plan::Done( outcome ) => {
                if outcome == PlayOutcome::Paused {
                    self.persist();
                }
                Ok( outcome )
            }
            Plan::Start( request ) => self.start( request ).await,
        }
    }


    async fn start( &self, request: StartRequest ) -> Result<PlayOutcome, ControllerError> {
        let url = match self.shared.resolver.resolve( &request.track ).await {
            Ok( url ) => url,
            Err( e ) => {
                tracing::warn!( "Cannot play {}: {}", request.track.id, e );
                return Err( e.into() );
            }
        };

        let outcome = {
            let mut core = self.write();
            if core.generation != request.generation {
                tracing::debug!( "Dropping stale start of {}", request.track.id );
                return Ok( PlayOutcome::Superseded );
            }

            let sink = &self.shared.sink;
            let session = &mut core.session;
            let id = request.track.id.clone();

            if request.kind == StartKind::Switch && !session.queue.contains( &id ) {
                session.queue.enqueue( [ request.track.clone() ] );
            }
            if request.reset_history {
                session.history.clear();
            }
            if request.record_history && session.queue.contains( &id ) {
                session.history.push( id.clone() );
            }

            tracing::info!( "Playing: {} ({})", request.track.name, id );
            session.current = Some( request.track );
            session.status = PlaybackStatus::Playing;

            sink.set_source( &url );
            if request.kind != StartKind::Resume {
                sink.set_position( 0.0 );
            }
            sink.play();

            match request.kind {
                StartKind::Resume => PlayOutcome::Resumed( id ),
                StartKind::Switch | StartKind::Replay => PlayOutcome::Started( id ),
            }
        };

        self.persist();
        Ok( outcome )
    }


    /// Picks an unvisited queue entry, or any entry once every track has
    /// been visited. History is only cleared when the pick commits.
    fn plan_random( &self, core: &mut Core ) -> Plan {
        let session = &core.session;
        let unvisited: Vec<&Track> = session.queue.iter()
            .filter( |t| !session.history.contains( &t.id ) )
            .collect();
        let reset_history = unvisited.is_empty();

        let pick = {
            let mut rng = self.shared.rng.lock().unwrap_or_else( PoisonError::into_inner );
            if reset_history {
                session.queue.tracks().choose( &mut *rng ).cloned()
            } else {
                unvisited.choose( &mut *rng ).map( |t| ( *t ).clone() )
            }
        };

        match pick {
            Some( track ) => match core.request( track, StartKind::Switch ) {
                Plan::Start( mut request ) => {
                    request.reset_history = reset_history;
                    Plan::Start( request )
                }
                done => done,
            },
            None => Plan::Done( PlayOutcome::Unchanged ),
        }
    }


    fn pause_locked( &self, core: &mut Core ) {
        core.next_generation();
        core.session.status = PlaybackStatus::Paused;
        self.shared.sink.pause();
        tracing::info!( "Paused" );
    }


    /// Subscribes to the sink's ended signal and drains it one event at a
    /// time, so natural ends are serialized with other commands.
    fn attach_sink( &self ) {
        let ( notifier, rx ) = EndedNotifier::channel();
        self.shared.sink.subscribe_ended( notifier );

        let weak = Arc::downgrade( &self.shared );
        let pump = tokio::spawn( pump_ended( weak, rx ) );
        if let Some( previous ) = self.lock_pump().replace( pump ) {
            previous.abort();
        }
    }


    fn persist( &self ) {
        let snapshot = self.snapshot();
        self.shared.persister.schedule( snapshot );
    }


    fn read( &self ) -> RwLockReadGuard<'_, Core> {
        self.shared.core.read().unwrap_or_else( PoisonError::into_inner )
    }


    fn write( &self ) -> RwLockWriteGuard<'_, Core> {
        self.shared.core.write().unwrap_or_else( PoisonError::into_inner )
    }


    fn lock_pump( &self ) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.shared.pump.lock().unwrap_or_else( PoisonError::into_inner )
    }
}


async fn pump_ended( shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<()> ) {
    while rx.recv().await.is_some() {
        let Some( shared ) = shared.upgrade() else {
            break;
        };
        let controller = PlaybackController { shared };
        if let Err( e ) = controller.on_track_ended().await {
            tracing::warn!( "Could not advance after track end: {}", e );
        }
    }
    tracing::debug!( "Sink event pump exiting" );
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::collections::{ HashMap, HashSet };

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::backend::MemoryCache;


    #[derive( Debug, Clone, PartialEq )]
    enum SinkCall {
        Source( String ),
        Position( f64 ),
        Play,
        Pause,
    }


    #[derive( Default )]
    struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
        notifier: Mutex<Option<EndedNotifier>>,
    }


    impl RecordingSink {
        fn calls( &self ) -> Vec<SinkCall> {
            self.calls.lock().unwrap().clone()
        }


        fn clear( &self ) {
            self.calls.lock().unwrap().clear();
        }


        fn finish_track( &self ) -> bool {
            self.notifier.lock().unwrap().as_ref().map( |n| n.notify() ).unwrap_or( false )
        }


        fn record( &self, call: SinkCall ) {
            self.calls.lock().unwrap().push( call );
        }
    }


    impl PlaybackSink for RecordingSink {
        fn set_source( &self, url: &str ) {
            self.record( SinkCall::Source( url.to_string() ) );
        }

        fn set_position( &self, seconds: f64 ) {
            self.record( SinkCall::Position( seconds ) );
        }

        fn play( &self ) {
            self.record( SinkCall::Play );
        }

        fn pause( &self ) {
            self.record( SinkCall::Pause );
        }

        fn subscribe_ended( &self, notifier: EndedNotifier ) {
            *self.notifier.lock().unwrap() = Some( notifier );
        }
    }


    /// Holds a resolution open until released.
    #[derive( Default )]
    struct Gate {
        entered: Notify,
        release: Notify,
    }


    /// Resolves `id` to `stream://id`. Ids listed in `unavailable` fail and
    /// ids with a gate wait until it is released.
    #[derive( Default )]
    struct FakeResolver {
        unavailable: Mutex<HashSet<String>>,
        gates: Mutex<HashMap<String, Arc<Gate>>>,
    }


    impl FakeResolver {
        fn fail( &self, id: &str ) {
            self.unavailable.lock().unwrap().insert( id.to_string() );
        }


        fn gate( &self, id: &str ) -> Arc<Gate> {
            let gate = Arc::new( Gate::default() );
            self.gates.lock().unwrap().insert( id.to_string(), Arc::clone( &gate ) );
            gate
        }
    }


    #[async_trait]
    impl TrackResolver for FakeResolver {
        async fn resolve( &self, track: &Track ) -> Result<String, ResolutionError> {
            let gate = self.gates.lock().unwrap().get( &track.id ).cloned();
            if let Some( gate ) = gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            if self.unavailable.lock().unwrap().contains( &track.id ) {
                return Err( ResolutionError::Unavailable( track.id.clone() ) );
            }
            Ok( format!( "stream://{}", track.id ) )
        }
    }


    struct Harness {
        controller: PlaybackController,
        sink: Arc<RecordingSink>,
        resolver: Arc<FakeResolver>,
        cache: Arc<MemoryCache>,
    }


    async fn harness_with( cache: MemoryCache ) -> Harness {
        let sink = Arc::new( RecordingSink::default() );
        let resolver = Arc::new( FakeResolver::default() );
        let cache = Arc::new( cache );
        let controller = PlaybackController::new(
            sink.clone(),
            resolver.clone(),
            cache.clone(),
            ControllerConfig { shuffle_seed: Some( 7 ), ..Default::default() },
        );
        controller.initialize().await;
        Harness { controller, sink, resolver, cache }
    }


    async fn harness() -> Harness {
        harness_with( MemoryCache::new() ).await
    }


    fn track( id: &str ) -> Track {
        Track::new( id, format!( "Track {}", id ), 200.0 )
    }


    fn tracks( ids: &[&str] ) -> Vec<Track> {
        ids.iter().map( |id| track( id ) ).collect()
    }


    fn queue_ids( controller: &PlaybackController ) -> Vec<TrackId> {
        controller.queue().into_iter().map( |t| t.id ).collect()
    }


    fn current_id( controller: &PlaybackController ) -> Option<TrackId> {
        controller.current().map( |t| t.id )
    }


    #[tokio::test]
    async fn test_initialize_empty() {
        let h = harness().await;

        assert_eq!( h.controller.state(), PlayerState::Empty );
        assert_eq!( h.controller.mode(), PlaybackMode::ListLoop );
        assert!( h.sink.calls().is_empty() );
    }


    #[tokio::test]
    async fn test_initialize_restores_and_preloads() {
        let snapshot = SessionSnapshot {
            queue: tracks( &[ "a", "b" ] ),
            mode: PlaybackMode::ListOrder,
            current: Some( track( "b" ) ),
            history: vec![ "a".into(), "b".into() ],
        };
        let cache = MemoryCache::with_entry( DEFAULT_STATE_KEY, snapshot.encode().unwrap() );
        let h = harness_with( cache ).await;

        assert_eq!( h.controller.state(), PlayerState::Stopped );
        assert_eq!( h.controller.mode(), PlaybackMode::ListOrder );
        assert_eq!( h.controller.history(), vec![ "a", "b" ] );
        assert_eq!( h.sink.calls(), vec![ SinkCall::Source( "stream://b".into() ) ] );
    }


    #[tokio::test]
    async fn test_initialize_corrupt_cache_falls_back() {
        let h = harness_with( MemoryCache::with_entry( DEFAULT_STATE_KEY, "}{" ) ).await;

        assert_eq!( h.controller.state(), PlayerState::Empty );
        assert!( h.controller.queue().is_empty() );
    }


    #[tokio::test]
    async fn test_play_new_track_starts_and_queues() {
        let h = harness().await;
        let outcome = h.controller.play( Some( track( "a" ) ) ).await.unwrap();

        assert_eq!( outcome, PlayOutcome::Started( "a".into() ) );
        assert_eq!( h.controller.state(), PlayerState::Playing );
        assert_eq!( queue_ids( &h.controller ), vec![ "a" ] );
        assert_eq!( h.controller.history(), vec![ "a" ] );
        assert_eq!( h.sink.calls(), vec![
            SinkCall::Source( "stream://a".into() ),
            SinkCall::Position( 0.0 ),
            SinkCall::Play,
        ]);
    }


    #[tokio::test]
    async fn test_play_toggles_current() {
        let h = harness().await;
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        h.sink.clear();

        let outcome = h.controller.play( None ).await.unwrap();
        assert_eq!( outcome, PlayOutcome::Paused );
        assert_eq!( h.sink.calls(), vec![ SinkCall::Pause ] );

        h.sink.clear();
        let outcome = h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        assert_eq!( outcome, PlayOutcome::Resumed( "a".into() ) );
        assert_eq!( h.controller.status(), PlaybackStatus::Playing );
        assert_eq!( h.sink.calls(), vec![
            SinkCall::Source( "stream://a".into() ),
            SinkCall::Play,
        ]);
    }


    #[tokio::test]
    async fn test_play_without_current_uses_queue_head() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );

        let outcome = h.controller.play( None ).await.unwrap();

        assert_eq!( outcome, PlayOutcome::Resumed( "a".into() ) );
        assert_eq!( current_id( &h.controller ).as_deref(), Some( "a" ) );
        assert_eq!( h.controller.history(), vec![ "a" ] );
    }


    #[tokio::test]
    async fn test_play_with_nothing_is_noop() {
        let h = harness().await;

        assert_eq!( h.controller.play( None ).await.unwrap(), PlayOutcome::Unchanged );
        assert_eq!( h.controller.state(), PlayerState::Empty );
    }


    #[tokio::test]
    async fn test_pause_requires_playing() {
        let h = harness().await;
        assert_eq!( h.controller.pause(), PlayOutcome::Unchanged );

        h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        assert_eq!( h.controller.pause(), PlayOutcome::Paused );
        assert_eq!( h.controller.state(), PlayerState::Paused );
    }


    #[tokio::test]
    async fn test_resolution_failure_leaves_state() {
        let h = harness().await;
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        h.resolver.fail( "b" );
        let before = h.controller.session();

        let result = h.controller.play( Some( track( "b" ) ) ).await;

        assert!( matches!( result, Err( ControllerError::Resolution( ResolutionError::Unavailable( _ ) ) ) ) );
        let after = h.controller.session();
        assert_eq!( after.current_id(), before.current_id() );
        assert_eq!( after.queue, before.queue );
        assert_eq!( after.history, before.history );
        assert_eq!( after.status, PlaybackStatus::Playing );
    }


    #[tokio::test]
    async fn test_stale_resolution_is_dropped() {
        let h = harness().await;
        let gate = h.resolver.gate( "slow" );

        let slow = {
            let controller = h.controller.clone();
            tokio::spawn( async move { controller.play( Some( track( "slow" ) ) ).await } )
        };
        gate.entered.notified().await;

        let fast = h.controller.play( Some( track( "fast" ) ) ).await.unwrap();
        assert_eq!( fast, PlayOutcome::Started( "fast".into() ) );

        gate.release.notify_one();
        let slow = slow.await.unwrap().unwrap();

        assert_eq!( slow, PlayOutcome::Superseded );
        assert_eq!( current_id( &h.controller ).as_deref(), Some( "fast" ) );
        assert_eq!( queue_ids( &h.controller ), vec![ "fast" ] );
    }


    #[tokio::test]
    async fn test_pause_cancels_pending_start() {
        let h = harness().await;
        let gate = h.resolver.gate( "a" );

        let pending = {
            let controller = h.controller.clone();
            tokio::spawn( async move { controller.play( Some( track( "a" ) ) ).await } )
        };
        gate.entered.notified().await;

        assert_eq!( h.controller.pause(), PlayOutcome::Unchanged );
        gate.release.notify_one();

        assert_eq!( pending.await.unwrap().unwrap(), PlayOutcome::Superseded );
        assert_eq!( h.controller.state(), PlayerState::Empty );
    }


    #[tokio::test]
    async fn test_history_holds_each_id_once() {
        let h = harness().await;
        for id in [ "a", "b", "a", "c", "b", "a" ] {
            h.controller.play( Some( track( id ) ) ).await.unwrap();
        }

        assert_eq!( h.controller.history(), vec![ "c", "b", "a" ] );
    }


    #[tokio::test]
    async fn test_skip_previous_walks_history() {
        let h = harness().await;
        for id in [ "a", "b", "c" ] {
            h.controller.play( Some( track( id ) ) ).await.unwrap();
        }

        assert_eq!( h.controller.skip_previous().await.unwrap(), PlayOutcome::Started( "b".into() ) );
        assert_eq!( h.controller.skip_previous().await.unwrap(), PlayOutcome::Started( "a".into() ) );
        assert_eq!( h.controller.skip_previous().await.unwrap(), PlayOutcome::Unchanged );
        assert_eq!( current_id( &h.controller ).as_deref(), Some( "a" ) );
    }


    #[tokio::test]
    async fn test_skip_previous_skips_dequeued() {
        let h = harness().await;
        for id in [ "a", "b" ] {
            h.controller.play( Some( track( id ) ) ).await.unwrap();
        }
        h.controller.dequeue( &[ "a" ] );

        assert_eq!( h.controller.skip_previous().await.unwrap(), PlayOutcome::Unchanged );
        assert_eq!( current_id( &h.controller ).as_deref(), Some( "b" ) );
    }


    #[tokio::test]
    async fn test_skip_next_list_modes() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b", "c" ] ) );
        h.controller.play( Some( track( "c" ) ) ).await.unwrap();

        h.controller.set_mode( Some( PlaybackMode::ListOrder ) );
        assert_eq!( h.controller.skip_next().await.unwrap(), PlayOutcome::Unchanged );
        assert_eq!( h.controller.status(), PlaybackStatus::Playing );

        h.controller.set_mode( Some( PlaybackMode::ListLoop ) );
        assert_eq!( h.controller.skip_next().await.unwrap(), PlayOutcome::Started( "a".into() ) );
        assert_eq!( h.controller.skip_next().await.unwrap(), PlayOutcome::Started( "b".into() ) );
    }


    #[tokio::test]
    async fn test_skip_next_without_current() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a" ] ) );

        assert_eq!( h.controller.skip_next().await.unwrap(), PlayOutcome::Unchanged );
    }


    #[tokio::test]
    async fn test_track_end_list_order_stops() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.set_mode( Some( PlaybackMode::ListOrder ) );
        h.controller.play( Some( track( "b" ) ) ).await.unwrap();

        assert_eq!( h.controller.on_track_ended().await.unwrap(), PlayOutcome::Stopped );
        assert_eq!( current_id( &h.controller ).as_deref(), Some( "b" ) );
        assert_eq!( h.controller.state(), PlayerState::Stopped );
    }


    #[tokio::test]
    async fn test_track_end_list_loop_wraps() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.play( Some( track( "b" ) ) ).await.unwrap();

        assert_eq!( h.controller.on_track_ended().await.unwrap(), PlayOutcome::Started( "a".into() ) );
        assert_eq!( h.controller.state(), PlayerState::Playing );
    }


    #[tokio::test]
    async fn test_track_end_single_loop_replays() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.set_mode( Some( PlaybackMode::SingleLoop ) );
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        h.sink.clear();

        let outcome = h.controller.on_track_ended().await.unwrap();

        assert_eq!( outcome, PlayOutcome::Started( "a".into() ) );
        assert_eq!( h.controller.status(), PlaybackStatus::Playing );
        assert_eq!( h.sink.calls(), vec![
            SinkCall::Source( "stream://a".into() ),
            SinkCall::Position( 0.0 ),
            SinkCall::Play,
        ]);
    }


    #[tokio::test]
    async fn test_track_end_failed_resolution_keeps_state() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        h.resolver.fail( "b" );
        let before = h.controller.session();
        h.sink.clear();

        let result = h.controller.on_track_ended().await;

        assert!( matches!( result, Err( ControllerError::Resolution( _ ) ) ) );
        let after = h.controller.session();
        assert_eq!( after.status, PlaybackStatus::Playing );
        assert_eq!( after.current_id(), before.current_id() );
        assert_eq!( after.history, before.history );
        assert!( h.sink.calls().is_empty() );
    }


    #[tokio::test]
    async fn test_single_loop_failed_replay_keeps_state() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.set_mode( Some( PlaybackMode::SingleLoop ) );
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        h.resolver.fail( "a" );
        h.sink.clear();

        let result = h.controller.on_track_ended().await;

        assert!( matches!( result, Err( ControllerError::Resolution( _ ) ) ) );
        assert_eq!( h.controller.status(), PlaybackStatus::Playing );
        assert_eq!( current_id( &h.controller ).as_deref(), Some( "a" ) );
        assert!( h.sink.calls().is_empty() );
    }


    #[tokio::test]
    async fn test_random_visits_every_track_once() {
        let ids = [ "a", "b", "c", "d", "e", "f" ];
        let h = harness().await;
        h.controller.enqueue( tracks( &ids ) );
        h.controller.set_mode( Some( PlaybackMode::Random ) );
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();

        let mut seen = vec![ "a".to_string() ];
        for _ in 1..ids.len() {
            h.controller.on_track_ended().await.unwrap();
            seen.push( current_id( &h.controller ).unwrap() );
        }

        let unique: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!( unique.len(), ids.len() );

        // Cycle complete: history restarts with the next pick.
        h.controller.on_track_ended().await.unwrap();
        assert_eq!( h.controller.history().len(), 1 );
    }


    #[tokio::test]
    async fn test_random_skip_next_uses_random_policy() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.set_mode( Some( PlaybackMode::Random ) );
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();

        assert_eq!( h.controller.skip_next().await.unwrap(), PlayOutcome::Started( "b".into() ) );
    }


    #[tokio::test]
    async fn test_ended_signal_from_sink() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();

        assert!( h.sink.finish_track() );
        for _ in 0..50 {
            if current_id( &h.controller ).as_deref() == Some( "b" ) {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!( current_id( &h.controller ).as_deref(), Some( "b" ) );
    }


    #[tokio::test]
    async fn test_enqueue_moves_duplicate() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b", "c" ] ) );
        h.controller.enqueue( tracks( &[ "a" ] ) );

        assert_eq!( queue_ids( &h.controller ), vec![ "b", "c", "a" ] );
    }


    #[tokio::test]
    async fn test_dequeue_current_keeps_current() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b" ] ) );
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();

        assert_eq!( h.controller.dequeue( &[ "a" ] ), 1 );

        assert_eq!( current_id( &h.controller ).as_deref(), Some( "a" ) );
        assert!( h.controller.history().is_empty() );
        assert_eq!( queue_ids( &h.controller ), vec![ "b" ] );

        // Next from a track that left the queue starts at the head.
        assert_eq!( h.controller.on_track_ended().await.unwrap(), PlayOutcome::Started( "b".into() ) );
    }


    #[tokio::test]
    async fn test_clear_queue() {
        let h = harness().await;
        h.controller.play( Some( track( "a" ) ) ).await.unwrap();
        h.controller.clear_queue();

        assert!( h.controller.queue().is_empty() );
        assert!( h.controller.history().is_empty() );
        assert_eq!( h.controller.state(), PlayerState::Playing );
    }


    #[tokio::test]
    async fn test_set_mode_cycles() {
        let h = harness().await;

        assert_eq!( h.controller.set_mode( None ), PlaybackMode::Random );
        assert_eq!( h.controller.set_mode( None ), PlaybackMode::ListOrder );
        assert_eq!( h.controller.set_mode( None ), PlaybackMode::SingleLoop );
        assert_eq!( h.controller.set_mode( Some( PlaybackMode::Random ) ), PlaybackMode::Random );
    }


    #[tokio::test]
    async fn test_insert_next() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b", "c" ] ) );
        assert_eq!( h.controller.insert_next( track( "x" ) ), InsertNext::CurrentMissing );

        h.controller.play( Some( track( "b" ) ) ).await.unwrap();
        assert_eq!( h.controller.insert_next( track( "x" ) ), InsertNext::Inserted { index: 2 } );
        assert_eq!( queue_ids( &h.controller ), vec![ "a", "b", "x", "c" ] );
    }


    #[tokio::test( start_paused = true )]
    async fn test_changes_are_debounced() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a" ] ) );
        h.controller.set_mode( Some( PlaybackMode::Random ) );
        h.controller.enqueue( tracks( &[ "b" ] ) );
        assert_eq!( h.cache.write_count(), 0 );

        tokio::time::sleep( DEFAULT_PERSIST_DELAY * 2 ).await;

        assert_eq!( h.cache.write_count(), 1 );
        let stored = SessionSnapshot::decode( &h.cache.peek( DEFAULT_STATE_KEY ).unwrap() ).unwrap();
        assert_eq!( stored.mode, PlaybackMode::Random );
        assert_eq!( stored.queue.len(), 2 );
    }


    #[tokio::test]
    async fn test_shutdown_round_trip() {
        let h = harness().await;
        h.controller.enqueue( tracks( &[ "a", "b", "c" ] ) );
        h.controller.play( Some( track( "b" ) ) ).await.unwrap();
        h.controller.set_mode( Some( PlaybackMode::SingleLoop ) );
        h.controller.shutdown().await;

        let raw = h.cache.peek( DEFAULT_STATE_KEY ).unwrap();
        let restored = harness_with( MemoryCache::with_entry( DEFAULT_STATE_KEY, raw ) ).await;

        assert_eq!( queue_ids( &restored.controller ), vec![ "a", "b", "c" ] );
        assert_eq!( restored.controller.history(), vec![ "b" ] );
        assert_eq!( current_id( &restored.controller ).as_deref(), Some( "b" ) );
        assert_eq!( restored.controller.mode(), PlaybackMode::SingleLoop );
        assert_eq!( restored.controller.state(), PlayerState::Stopped );
    }
}
