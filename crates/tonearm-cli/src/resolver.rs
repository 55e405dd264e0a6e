//! Track id to URL resolution for local files and web streams.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::time::Duration;

use async_trait::async_trait;
use tonearm_core::{ ResolutionError, Track, TrackResolver };


/// Track lengths keyed by the URL they resolved to. Filled in by the
/// resolver so the sink never has to open a file to learn a length.
#[derive( Debug, Default )]
pub struct SourceLengths {
    lengths: Mutex<HashMap<String, Duration>>,
}


impl SourceLengths {
    /// Remembers the length of `url`. Unknown (zero) lengths are ignored.
    pub fn record( &self, url: &str, seconds: f64 ) {
        if seconds.is_finite() && seconds > 0.0 {
            self.lock().insert( url.to_string(), Duration::from_secs_f64( seconds ) );
        }
    }


    pub fn get( &self, url: &str ) -> Option<Duration> {
        self.lock().get( url ).copied()
    }


    fn lock( &self ) -> MutexGuard<'_, HashMap<String, Duration>> {
        self.lengths.lock().unwrap_or_else( PoisonError::into_inner )
    }
}


/// Resolves a track whose id is a file path or an http(s) URL.
#[derive( Debug, Default )]
pub struct PathResolver {
    lengths: Arc<SourceLengths>,
}


impl PathResolver {
    pub fn new( lengths: Arc<SourceLengths> ) -> Self {
        Self { lengths }
    }


    async fn locate( &self, track: &Track ) -> Result<String, ResolutionError> {
        let id = track.id.as_str();

        if id.starts_with( "http://" ) || id.starts_with( "https://" ) {
            return Ok( id.to_string() );
        }

        let path = Path::new( id.strip_prefix( "file://" ).unwrap_or( id ) );
        match tokio::fs::canonicalize( path ).await {
            Ok( absolute ) => Ok( format!( "file://{}", absolute.display() ) ),
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
                Err( ResolutionError::Unavailable( track.id.clone() ) )
            }
            Err( e ) => Err( ResolutionError::Failed { id: track.id.clone(), reason: e.to_string() } ),
        }
    }
}


#[async_trait]
impl TrackResolver for PathResolver {
    async fn resolve( &self, track: &Track ) -> Result<String, ResolutionError> {
        let url = self.locate( track ).await?;
        self.lengths.record( &url, track.duration );
        Ok( url )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[tokio::test]
    async fn test_streams_pass_through() {
        let lengths = Arc::new( SourceLengths::default() );
        let track = Track::new( "https://radio.example/live", "Live", 0.0 );
        let url = PathResolver::new( lengths.clone() ).resolve( &track ).await.unwrap();

        assert_eq!( url, "https://radio.example/live" );
        assert_eq!( lengths.get( &url ), None );
    }


    #[tokio::test]
    async fn test_local_file_becomes_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join( "song.mp3" );
        std::fs::write( &song, b"" ).unwrap();
        let lengths = Arc::new( SourceLengths::default() );

        let track = Track::new( song.to_string_lossy(), "Song", 1.5 );
        let url = PathResolver::new( lengths.clone() ).resolve( &track ).await.unwrap();

        assert_eq!( url, format!( "file://{}", song.canonicalize().unwrap().display() ) );
        assert_eq!( lengths.get( &url ), Some( Duration::from_millis( 1500 ) ) );
    }


    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let track = Track::new( "/nowhere/gone.mp3", "Gone", 1.0 );
        let result = PathResolver::default().resolve( &track ).await;

        assert!( matches!( result, Err( ResolutionError::Unavailable( id ) ) if id == "/nowhere/gone.mp3" ) );
    }
}
