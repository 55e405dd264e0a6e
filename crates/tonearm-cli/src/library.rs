//! Library scanning
//!
//! Turns files and folders named on the command line into queue entries.
//! Each file is probed with Symphonia for its tags and length; the track id
//! is the file path.

use std::fs::File;
use std::path::{ Path, PathBuf };

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::Hint;
use thiserror::Error;
use tonearm_core::Track;


/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma", "aiff", "alac",
];


/// Errors that can occur during library operations.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "Unsupported format: {0}" )]
    UnsupportedFormat( PathBuf ),
}


/// Tags and length read from an audio file.
#[derive( Debug, Clone, Default, PartialEq )]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_secs: Option<f64>,
}


impl TrackTags {
    fn absorb( &mut self, tags: &[Tag] ) {
        for tag in tags {
            let Some( key ) = tag.std_key else { continue };
            let slot = match key {
                StandardTagKey::TrackTitle => &mut self.title,
                StandardTagKey::Artist => &mut self.artist,
                StandardTagKey::Album => &mut self.album,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some( tag.value.to_string() );
            }
        }
    }
}


/// Collects every audio file under `path`, in directory order.
///
/// A plain file is returned as a single track if it has an audio extension.
pub fn scan( path: &Path ) -> Result<Vec<Track>, LibraryError> {
    if !path.exists() {
        return Err( LibraryError::NotFound( path.to_path_buf() ) );
    }

    let mut files = Vec::new();
    if path.is_dir() {
        tracing::info!( "Scanning: {:?}", path );
        scan_recursive( path, &mut files )?;
    } else if is_audio_file( path ) {
        files.push( path.to_path_buf() );
    }

    let tracks: Vec<Track> = files.iter().map( |file| load_track( file ) ).collect();
    tracing::info!( "Found {} tracks", tracks.len() );
    Ok( tracks )
}


fn scan_recursive( dir: &Path, files: &mut Vec<PathBuf> ) -> Result<(), LibraryError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!( "Access denied: {:?}", dir );
            return Ok(());
        }
        Err( e ) => return Err( LibraryError::Io( e ) ),
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map( |entry| entry.path() ).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scan_recursive( &path, files )?;
        } else if is_audio_file( &path ) {
            files.push( path );
        }
    }

    Ok(())
}


/// Builds a queue entry for one file. Files Symphonia cannot read still
/// get an entry named after the file, with zero length.
pub fn load_track( path: &Path ) -> Track {
    let tags = probe( path ).unwrap_or_else( |e| {
        tracing::debug!( "No tags for {:?}: {}", path, e );
        TrackTags::default()
    });

    let name = tags.title.clone().unwrap_or_else( || file_title( path ) );
    let mut track = Track::new( path.to_string_lossy(), name, tags.duration_secs.unwrap_or( 0.0 ) );
    if let Some( artist ) = tags.artist {
        track = track.with_author( artist );
    }
    if let Some( album ) = tags.album {
        track = track.with_extra_data( serde_json::json!({ "album": album }) );
    }
    track
}


/// Reads tags and length without decoding any audio.
pub fn probe( path: &Path ) -> Result<TrackTags, LibraryError> {
    let file = File::open( path )?;
    let mss = MediaSourceStream::new( Box::new( file ), Default::default() );

    let mut hint = Hint::new();
    if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
        hint.with_extension( ext );
    }

    let probed = symphonia::default::get_probe()
        .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
        .map_err( |_| LibraryError::UnsupportedFormat( path.to_path_buf() ) )?;

    let mut probe_metadata = probed.metadata;
    let mut format_reader = probed.format;
    let mut tags = TrackTags::default();

    // Container-level tags first (ID3 etc.), then whatever the reader found
    if let Some( metadata_log ) = probe_metadata.get() {
        if let Some( metadata_rev ) = metadata_log.current() {
            tags.absorb( metadata_rev.tags() );
        }
    }
    if let Some( metadata_rev ) = format_reader.metadata().current() {
        tags.absorb( metadata_rev.tags() );
    }

    tags.duration_secs = format_reader.default_track().and_then( |track| {
        let params = &track.codec_params;
        let frames = params.n_frames?;
        match params.time_base {
            Some( time_base ) => {
                let time = time_base.calc_time( frames );
                Some( time.seconds as f64 + time.frac )
            }
            None => params.sample_rate.map( |rate| frames as f64 / rate as f64 ),
        }
    });

    Ok( tags )
}


/// Checks if a file has a supported audio extension.
fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


fn file_title( path: &Path ) -> String {
    path.file_stem()
        .map( |s| s.to_string_lossy().into_owned() )
        .unwrap_or_else( || path.display().to_string() )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_scan_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir( dir.path().join( "disc2" ) ).unwrap();
        std::fs::write( dir.path().join( "b.flac" ), b"" ).unwrap();
        std::fs::write( dir.path().join( "a.MP3" ), b"" ).unwrap();
        std::fs::write( dir.path().join( "cover.jpg" ), b"" ).unwrap();
        std::fs::write( dir.path().join( "disc2" ).join( "c.ogg" ), b"" ).unwrap();

        let tracks = scan( dir.path() ).unwrap();
        let names: Vec<&str> = tracks.iter().map( |t| t.name.as_str() ).collect();

        assert_eq!( names, vec![ "a", "b", "c" ] );
        assert!( tracks.iter().all( |t| t.duration == 0.0 ) );
        assert_eq!( tracks[ 0 ].id, dir.path().join( "a.MP3" ).to_string_lossy() );
    }


    #[test]
    fn test_scan_missing_path() {
        let result = scan( Path::new( "/definitely/not/here" ) );
        assert!( matches!( result, Err( LibraryError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_scan_single_non_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join( "notes.txt" );
        std::fs::write( &notes, b"hello" ).unwrap();

        assert!( scan( &notes ).unwrap().is_empty() );
    }


    #[test]
    fn test_garbage_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join( "bogus.mp3" );
        std::fs::write( &bogus, b"not really audio" ).unwrap();

        assert!( probe( &bogus ).is_err() );
        assert_eq!( load_track( &bogus ).name, "bogus" );
    }
}
