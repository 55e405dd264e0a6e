//! Tonearm CLI - line-oriented music player

mod cache;
mod cli;
mod library;
mod resolver;
mod settings;
mod sink;
mod view;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{ Context, Result };
use clap::Parser;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tracing_subscriber::prelude::*;

use cache::FileCache;
use cli::Args;
use resolver::{ PathResolver, SourceLengths };
use settings::Settings;
use sink::ClockSink;

use tonearm_core::{
    command::{ self, CommandError },
    Command, ControllerConfig, InsertNext, PlayOutcome, PlaybackController, PlayerState, Track,
};


/// Application state.
struct App {
    controller: PlaybackController,
    sink: Arc<ClockSink>,
    should_quit: bool,
}


impl App {
    fn new( controller: PlaybackController, sink: Arc<ClockSink> ) -> Self {
        Self {
            controller,
            sink,
            should_quit: false,
        }
    }


    fn set_status( &self, msg: impl AsRef<str> ) {
        println!( "{}", msg.as_ref() );
    }


    /// Queues every audio file under `path`.
    fn add_path( &self, path: &Path ) -> Result<usize> {
        let tracks = library::scan( path )?;
        Ok( self.controller.enqueue( tracks ) )
    }


    /// Finds the track a user argument refers to: a 1-based queue
    /// position, a queued id, or a file on disk.
    fn resolve_target( &self, target: &str ) -> Option<Track> {
        let queue = self.controller.queue();

        if let Ok( position ) = target.parse::<usize>() {
            return position.checked_sub( 1 ).and_then( |i| queue.get( i ).cloned() );
        }

        if let Some( track ) = queue.iter().find( |t| t.id == target ) {
            return Some( track.clone() );
        }

        let path = Path::new( target );
        path.is_file().then( || library::load_track( path ) )
    }


    /// Like [`resolve_target`](Self::resolve_target), failing with
    /// `NotFound` when nothing matches.
    fn target( &self, target: &str ) -> Result<Track, CommandError> {
        self.resolve_target( target )
            .ok_or_else( || CommandError::NotFound( target.to_string() ) )
    }


    fn describe( &self, outcome: PlayOutcome ) -> String {
        match outcome {
            PlayOutcome::Started( _ ) | PlayOutcome::Resumed( _ ) => {
                view::now_playing( &self.controller.session(), self.sink.position() )
            }
            PlayOutcome::Paused => "Paused".to_string(),
            PlayOutcome::Stopped => "Stopped at end of queue".to_string(),
            PlayOutcome::Unchanged => "Nothing to play".to_string(),
            PlayOutcome::Superseded => "Interrupted by a newer command".to_string(),
        }
    }


    /// Executes a command string.
    async fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( cmd ) => {
                if let Err( e ) = self.run_command( cmd ).await {
                    self.set_status( format!( "Error: {}", e ) );
                }
            }
            Err( e ) => {
                self.set_status( format!( "{}", e ) );
            }
        }
    }


    /// Runs a parsed command.
    async fn run_command( &mut self, cmd: Command ) -> Result<()> {
        match cmd {
            Command::Add { path } => {
                let added = self.add_path( &path )?;
                self.set_status( format!( "Added {} tracks", added ) );
            }
            Command::Remove { targets } => {
                let ids: Vec<String> = targets
                    .iter()
                    .filter_map( |t| self.resolve_target( t ) )
                    .map( |t| t.id )
                    .collect();
                let removed = self.controller.dequeue( &ids );
                self.set_status( format!( "Removed {} tracks", removed ) );
            }
            Command::Clear => {
                self.controller.clear_queue();
                self.set_status( "Queue cleared" );
            }
            Command::Insert { target } => {
                let track = self.target( &target )?;
                let name = track.name.clone();
                match self.controller.insert_next( track ) {
                    InsertNext::Inserted { index } => {
                        self.set_status( format!( "{} will play next (#{})", name, index + 1 ) )
                    }
                    InsertNext::CurrentAtHead => self.set_status( format!( "{} is already playing", name ) ),
                    InsertNext::CurrentMissing => self.set_status( "Nothing is playing from the queue" ),
                }
            }
            Command::Mode { mode } => {
                let mode = self.controller.set_mode( mode );
                self.set_status( format!( "Mode: {}", mode.name() ) );
            }
            Command::Play { target } => {
                let track = target.map( |t| self.target( &t ) ).transpose()?;
                let outcome = self.controller.play( track ).await?;
                self.set_status( self.describe( outcome ) );
            }
            Command::Pause => {
                let outcome = self.controller.pause();
                self.set_status( self.describe( outcome ) );
            }
            Command::Next => {
                let outcome = self.controller.skip_next().await?;
                self.set_status( self.describe( outcome ) );
            }
            Command::Prev => {
                let outcome = self.controller.skip_previous().await?;
                self.set_status( self.describe( outcome ) );
            }
            Command::Queue => {
                for line in view::queue_lines( &self.controller.session() ) {
                    self.set_status( line );
                }
            }
            Command::History => {
                for line in view::history_lines( &self.controller.session() ) {
                    self.set_status( line );
                }
            }
            Command::Status => {
                self.set_status( view::now_playing( &self.controller.session(), self.sink.position() ) );
                if let Some( source ) = self.sink.source() {
                    let clock = if self.sink.is_playing() { "running" } else { "held" };
                    self.set_status( format!( "  source: {} ({})", source, clock ) );
                }
            }
            Command::Help => {
                self.set_status( command::help_text() );
            }
            Command::Quit => {
                self.should_quit = true;
            }
        }
        Ok(())
    }


    /// Reads commands from stdin until `/quit` or end of input.
    async fn run( &mut self ) -> Result<()> {
        let mut lines = BufReader::new( tokio::io::stdin() ).lines();

        while !self.should_quit {
            print!( "tonearm> " );
            std::io::stdout().flush()?;

            let Some( line ) = lines.next_line().await? else { break };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            self.execute_command( input.strip_prefix( '/' ).unwrap_or( input ) ).await;
        }

        Ok(())
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else( |_| "tonearm=info,tonearm_core=info".into() ),
        )
        .with( tracing_subscriber::fmt::layer().with_writer( std::io::stderr ) )
        .init();

    let args = Args::parse();
    let settings = Settings::load();

    let state_dir = args.state_dir
        .clone()
        .or_else( Settings::state_dir )
        .context( "No data directory available, pass --state-dir" )?;
    let cache = Arc::new( FileCache::new( state_dir ) );
    tracing::info!( "Session directory: {:?}", cache.dir() );

    let lengths = Arc::new( SourceLengths::default() );
    let sink = Arc::new( ClockSink::new( settings.fallback_duration(), lengths.clone() ) );
    let controller = PlaybackController::new(
        sink.clone(),
        Arc::new( PathResolver::new( lengths ) ),
        cache,
        ControllerConfig {
            state_key: settings.state_key.clone(),
            persist_delay: settings.persist_delay(),
            shuffle_seed: args.seed,
        },
    );

    let state = controller.initialize().await;
    let mut app = App::new( controller, sink );

    for path in &args.files {
        match app.add_path( path ) {
            Ok( added ) => tracing::info!( "Queued {} tracks from {:?}", added, path ),
            Err( e ) => app.set_status( format!( "Could not add {}: {}", path.display(), e ) ),
        }
    }

    if args.play && state != PlayerState::Playing {
        let outcome = app.controller.play( None ).await?;
        app.set_status( app.describe( outcome ) );
    } else {
        app.set_status( view::now_playing( &app.controller.session(), 0.0 ) );
    }

    let result = app.run().await;
    app.controller.shutdown().await;
    result
}


#[cfg( test )]
mod tests {
    use super::*;
    use tonearm_core::MemoryCache;


    async fn app() -> App {
        let sink = Arc::new( ClockSink::new( None, Arc::default() ) );
        let controller = PlaybackController::new(
            sink.clone(),
            Arc::new( PathResolver::default() ),
            Arc::new( MemoryCache::new() ),
            ControllerConfig::default(),
        );
        controller.initialize().await;
        controller.enqueue( vec![
            Track::new( "https://radio.example/a", "A", 10.0 ),
            Track::new( "https://radio.example/b", "B", 10.0 ),
        ]);
        App::new( controller, sink )
    }


    #[tokio::test]
    async fn test_resolve_target_by_position_and_id() {
        let app = app().await;

        assert_eq!( app.resolve_target( "2" ).map( |t| t.name ), Some( "B".to_string() ) );
        assert_eq!( app.resolve_target( "https://radio.example/a" ).map( |t| t.name ), Some( "A".to_string() ) );
        assert!( app.resolve_target( "0" ).is_none() );
        assert!( app.resolve_target( "9" ).is_none() );
        assert!( app.resolve_target( "/no/such/file.mp3" ).is_none() );
    }


    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let mut app = app().await;

        let result = app.target( "7" );
        assert!( matches!( result, Err( CommandError::NotFound( t ) ) if t == "7" ) );

        app.execute_command( "play 7" ).await;
        app.execute_command( "insert nowhere.mp3" ).await;
        assert!( app.controller.current().is_none() );
        assert_eq!( app.controller.queue().len(), 2 );
    }


    #[tokio::test]
    async fn test_commands_drive_controller() {
        let mut app = app().await;

        app.execute_command( "play 2" ).await;
        assert_eq!( app.controller.current().map( |t| t.name ), Some( "B".to_string() ) );
        assert!( app.sink.is_playing() );

        app.execute_command( "pause" ).await;
        assert!( !app.sink.is_playing() );

        app.execute_command( "mode random" ).await;
        assert_eq!( app.controller.mode(), tonearm_core::PlaybackMode::Random );

        app.execute_command( "rm 1" ).await;
        assert_eq!( app.controller.queue().len(), 1 );

        app.execute_command( "quit" ).await;
        assert!( app.should_quit );
    }
}
