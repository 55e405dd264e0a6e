//! Plain-text rendering of the session for the terminal.

use tonearm_core::{ PlaybackStatus, SessionState, Track };


const PROGRESS_WIDTH: usize = 20;


/// Formats seconds as M:SS.
pub fn format_time( seconds: f64 ) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    format!( "{}:{:02}", secs / 60, secs % 60 )
}


fn progress_bar( position: f64, duration: f64 ) -> String {
    let progress = if duration > 0.0 { ( position / duration ).clamp( 0.0, 1.0 ) } else { 0.0 };
    let filled = ( progress * PROGRESS_WIDTH as f64 ).round() as usize;
    format!( "[{}{}]", "#".repeat( filled ), "-".repeat( PROGRESS_WIDTH - filled ) )
}


fn track_label( track: &Track ) -> String {
    match &track.author {
        Some( author ) => format!( "{} - {}", author, track.name ),
        None => track.name.clone(),
    }
}


/// Now-playing summary: status, track, progress and mode.
pub fn now_playing( session: &SessionState, position: f64 ) -> String {
    let Some( track ) = &session.current else {
        return format!( "Nothing loaded  (mode: {})", session.mode.name() );
    };

    let state_str = match session.status {
        PlaybackStatus::Playing => ">",
        PlaybackStatus::Paused => "||",
        PlaybackStatus::Stopped => "[]",
    };

    format!(
        "{} {}  {} {}/{}  (mode: {})",
        state_str,
        track_label( track ),
        progress_bar( position, track.duration ),
        format_time( position ),
        format_time( track.duration ),
        session.mode.name(),
    )
}


/// Numbered queue listing with the current track marked.
pub fn queue_lines( session: &SessionState ) -> Vec<String> {
    if session.queue.is_empty() {
        return vec![ "Queue is empty".to_string() ];
    }

    let current = session.current_id();
    session.queue
        .iter()
        .enumerate()
        .map( |( i, track )| {
            let marker = if current == Some( track.id.as_str() ) { "*" } else { " " };
            format!( "{}{:>3}. {}  [{}]", marker, i + 1, track_label( track ), format_time( track.duration ) )
        })
        .collect()
}


/// History listing, oldest first, using queue names where known.
pub fn history_lines( session: &SessionState ) -> Vec<String> {
    if session.history.is_empty() {
        return vec![ "History is empty".to_string() ];
    }

    session.history
        .ids()
        .iter()
        .enumerate()
        .map( |( i, id )| {
            let label = session.queue.find( id ).map( track_label ).unwrap_or_else( || id.clone() );
            format!( "{:>4}. {}", i + 1, label )
        })
        .collect()
}


#[cfg( test )]
mod tests {
    use super::*;
    use tonearm_core::{ PlaybackMode, Queue };


    fn session() -> SessionState {
        let mut session = SessionState::default();
        session.queue = Queue::from_tracks( vec![
            Track::new( "a", "Alpha", 65.0 ).with_author( "Band" ),
            Track::new( "b", "Beta", 200.0 ),
        ]);
        session
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 65.9 ), "1:05" );
        assert_eq!( format_time( 3600.0 ), "60:00" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
    }


    #[test]
    fn test_queue_marks_current() {
        let mut session = session();
        session.current = session.queue.find( "b" ).cloned();

        let lines = queue_lines( &session );

        assert_eq!( lines[ 0 ], "   1. Band - Alpha  [1:05]" );
        assert_eq!( lines[ 1 ], "*  2. Beta  [3:20]" );
    }


    #[test]
    fn test_now_playing() {
        let mut session = session();
        assert_eq!( now_playing( &session, 0.0 ), "Nothing loaded  (mode: List loop)" );

        session.current = session.queue.find( "b" ).cloned();
        session.status = PlaybackStatus::Playing;
        session.mode = PlaybackMode::Random;

        let line = now_playing( &session, 100.0 );
        assert!( line.starts_with( "> Beta  [##########----------] 1:40/3:20" ) );
        assert!( line.ends_with( "(mode: Random)" ) );
    }


    #[test]
    fn test_history_falls_back_to_id() {
        let mut session = session();
        session.history.push( "a" );
        session.history.push( "gone" );

        assert_eq!( history_lines( &session ), vec![ "   1. Band - Alpha", "   2. gone" ] );
    }
}
