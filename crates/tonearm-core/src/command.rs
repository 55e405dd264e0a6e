//! Slash command parsing.
//!
//! Front ends read a line such as `/mode random` and turn it into a
//! [`Command`] that maps onto one controller operation.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::session::PlaybackMode;


/// Errors that can occur during command parsing or execution.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),

    #[error( "No such track: {0}" )]
    NotFound( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Queue commands
    Add { path: PathBuf },
    Remove { targets: Vec<String> },
    Clear,
    Insert { target: String },
    Mode { mode: Option<PlaybackMode> },

    // Playback commands
    Play { target: Option<String> },
    Pause,
    Next,
    Prev,

    // Display commands
    Queue,
    History,
    Status,
    Help,
    Quit,
}


/// Mode argument as typed by the user.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct ModeArg( pub PlaybackMode );


impl FromStr for ModeArg {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "one" | "repeat" => Ok( ModeArg( PlaybackMode::SingleLoop ) ),
            "loop" | "all" | "list" => Ok( ModeArg( PlaybackMode::ListLoop ) ),
            "order" | "once" | "off" => Ok( ModeArg( PlaybackMode::ListOrder ) ),
            "random" | "shuffle" => Ok( ModeArg( PlaybackMode::Random ) ),
            _ => Err( CommandError::InvalidArgument(
                format!( "Invalid mode: '{}'. Use 'single', 'loop', 'order', or 'random'", s )
            )),
        }
    }
}


impl Command {
    /// Parses a command string (without the leading `/`).
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            // Queue commands
            "add" | "a" => {
                let path = args
                    .ok_or_else( || CommandError::MissingArgument( "path".into() ) )?;
                Ok( Command::Add { path: PathBuf::from( path ) } )
            }
            "remove" | "rm" | "del" => {
                let targets: Vec<String> = args
                    .ok_or_else( || CommandError::MissingArgument( "track".into() ) )?
                    .split_whitespace()
                    .map( String::from )
                    .collect();
                Ok( Command::Remove { targets } )
            }
            "clear" | "cl" => Ok( Command::Clear ),
            "insert" | "ins" | "playnext" => {
                let target = args
                    .ok_or_else( || CommandError::MissingArgument( "track".into() ) )?;
                Ok( Command::Insert { target: target.to_string() } )
            }
            "mode" | "m" => {
                let mode = args.map( |s| s.parse::<ModeArg>() ).transpose()?;
                Ok( Command::Mode { mode: mode.map( |m| m.0 ) } )
            }

            // Playback commands
            "play" | "p" => Ok( Command::Play { target: args.map( String::from ) } ),
            "pause" | "pa" => Ok( Command::Pause ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),

            // Display commands
            "queue" | "q" | "ls" => Ok( Command::Queue ),
            "history" | "hist" => Ok( Command::History ),
            "status" | "st" => Ok( Command::Status ),
            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Add { .. } => "Add file/folder to queue",
            Command::Remove { .. } => "Remove tracks from queue",
            Command::Clear => "Clear queue and history",
            Command::Insert { .. } => "Play track after the current one",
            Command::Mode { .. } => "Set or cycle playback mode",
            Command::Play { .. } => "Play track, or toggle play/pause",
            Command::Pause => "Pause playback",
            Command::Next => "Next track",
            Command::Prev => "Previous track",
            Command::Queue => "Show queue",
            Command::History => "Show play history",
            Command::Status => "Show now playing",
            Command::Help => "Show help",
            Command::Quit => "Quit application",
        }
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Queue Commands:
  /add <path>       Add file/folder to queue
  /remove <track..> Remove tracks (position or id)
  /clear            Clear queue and history
  /insert <track>   Play track after the current one
  /mode [mode]      Set mode (single/loop/order/random) or cycle

Playback Commands:
  /play [track]     Play track, or toggle play/pause
  /pause            Pause playback
  /next             Next track
  /prev             Previous track

Other Commands:
  /queue            Show queue
  /history          Show play history
  /status           Show now playing
  /help             Show this help
  /quit             Save session and exit"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_add() {
        let cmd = Command::parse( "add /path/to/file.mp3" ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/path/to/file.mp3" ) } );
    }


    #[test]
    fn test_parse_remove_many() {
        let cmd = Command::parse( "rm 2  5 abc" ).unwrap();
        assert_eq!( cmd, Command::Remove { targets: vec![ "2".into(), "5".into(), "abc".into() ] } );
    }


    #[test]
    fn test_parse_play_optional_target() {
        assert_eq!( Command::parse( "play" ).unwrap(), Command::Play { target: None } );
        assert_eq!( Command::parse( "p   " ).unwrap(), Command::Play { target: None } );
        assert_eq!(
            Command::parse( "play 3" ).unwrap(),
            Command::Play { target: Some( "3".into() ) }
        );
    }


    #[test]
    fn test_parse_mode_with_value() {
        let cmd = Command::parse( "mode Shuffle" ).unwrap();
        assert_eq!( cmd, Command::Mode { mode: Some( PlaybackMode::Random ) } );
    }


    #[test]
    fn test_parse_mode_toggle() {
        let cmd = Command::parse( "mode" ).unwrap();
        assert_eq!( cmd, Command::Mode { mode: None } );
    }


    #[test]
    fn test_parse_mode_invalid() {
        let result = Command::parse( "mode sideways" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_not_found_names_target() {
        let err = CommandError::NotFound( "7".into() );
        assert_eq!( err.to_string(), "No such track: 7" );
    }


    #[test]
    fn test_parse_missing_arg() {
        assert!( matches!( Command::parse( "add" ), Err( CommandError::MissingArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "insert" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
