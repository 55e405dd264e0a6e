//! Application settings management
//!
//! Persistent knobs for the controller and the simulated output device.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{ Deserialize, Serialize };
use tonearm_core::controller::{ DEFAULT_PERSIST_DELAY, DEFAULT_STATE_KEY };


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Cache key the session is saved under
    pub state_key: String,

    /// Quiet period before a change is written, in milliseconds
    pub persist_delay_ms: u64,

    /// Length assumed for sources whose duration cannot be probed, in
    /// seconds. Zero means such tracks never end on their own.
    pub fallback_duration_secs: u64,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            state_key: DEFAULT_STATE_KEY.to_string(),
            persist_delay_ms: DEFAULT_PERSIST_DELAY.as_millis() as u64,
            fallback_duration_secs: 0,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "tonearm" ).join( "settings.json" ) )
    }


    /// Default directory for the saved session.
    pub fn state_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map( |d| d.join( "tonearm" ) )
    }


    /// Loads settings from disk. A missing file is created with defaults;
    /// an unreadable one is ignored.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            let settings = Self::default();
            settings.save();
            return settings;
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::parse( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    fn parse( contents: &str ) -> Self {
        serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Ignoring malformed settings: {}", e );
            Self::default()
        })
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return,
        };

        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( &path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    pub fn persist_delay( &self ) -> Duration {
        Duration::from_millis( self.persist_delay_ms )
    }


    pub fn fallback_duration( &self ) -> Option<Duration> {
        ( self.fallback_duration_secs > 0 ).then( || Duration::from_secs( self.fallback_duration_secs ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::parse( r#"{ "persist_delay_ms": 50 }"# );

        assert_eq!( settings.persist_delay(), Duration::from_millis( 50 ) );
        assert_eq!( settings.state_key, DEFAULT_STATE_KEY );
        assert_eq!( settings.fallback_duration(), None );
    }


    #[test]
    fn test_malformed_file_falls_back() {
        assert_eq!( Settings::parse( "[1, 2" ), Settings::default() );
    }
}
