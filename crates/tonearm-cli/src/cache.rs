//! File-backed session cache
//!
//! One JSON file per key inside the state directory. Writes go to a
//! temporary sibling first and are renamed into place, so a crash mid-write
//! leaves the previous session intact.

use std::io::ErrorKind;
use std::path::{ Path, PathBuf };

use async_trait::async_trait;
use tokio::fs;
use tonearm_core::{ PersistenceError, StateCache };


pub struct FileCache {
    dir: PathBuf,
}


impl FileCache {
    pub fn new( dir: impl Into<PathBuf> ) -> Self {
        Self { dir: dir.into() }
    }


    pub fn dir( &self ) -> &Path {
        &self.dir
    }


    /// Maps a cache key onto a file name, replacing anything that is not
    /// safe in a path component.
    fn entry_path( &self, key: &str ) -> PathBuf {
        let name: String = key
            .chars()
            .map( |c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' } )
            .collect();
        self.dir.join( format!( "{}.json", name ) )
    }
}


#[async_trait]
impl StateCache for FileCache {
    async fn get( &self, key: &str ) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string( self.entry_path( key ) ).await {
            Ok( contents ) => Ok( Some( contents ) ),
            Err( e ) if e.kind() == ErrorKind::NotFound => Ok( None ),
            Err( e ) => Err( PersistenceError::Io( e ) ),
        }
    }


    async fn set( &self, key: &str, value: String ) -> Result<(), PersistenceError> {
        fs::create_dir_all( &self.dir ).await?;

        let path = self.entry_path( key );
        let staging = path.with_extension( "json.tmp" );
        fs::write( &staging, value ).await?;
        fs::rename( &staging, &path ).await?;

        tracing::debug!( "Wrote {:?}", path );
        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new( dir.path() );

        assert!( cache.get( "tonearm.session" ).await.unwrap().is_none() );
    }


    #[tokio::test]
    async fn test_set_creates_dir_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new( dir.path().join( "nested" ) );

        cache.set( "tonearm.session", "{\"a\":1}".into() ).await.unwrap();
        cache.set( "tonearm.session", "{\"a\":2}".into() ).await.unwrap();

        assert_eq!( cache.get( "tonearm.session" ).await.unwrap().as_deref(), Some( "{\"a\":2}" ) );
        assert!( cache.dir().join( "tonearm.session.json" ).exists() );
        assert!( !cache.dir().join( "tonearm.session.json.tmp" ).exists() );
    }


    #[tokio::test]
    async fn test_key_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new( dir.path() );

        cache.set( "../escape/me", "x".into() ).await.unwrap();

        assert!( dir.path().join( ".._escape_me.json" ).exists() );
        assert_eq!( cache.get( "../escape/me" ).await.unwrap().as_deref(), Some( "x" ) );
    }
}
