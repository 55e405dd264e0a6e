//! Command-line argument parsing for Tonearm.

use std::path::PathBuf;

use clap::Parser;


/// Tonearm - a queue-driven music player for the terminal.
#[derive( Parser, Debug )]
#[command( name = "tonearm" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Directory holding the saved session. Defaults to the platform data dir.
    #[arg( short, long )]
    pub state_dir: Option<PathBuf>,

    /// Seed for random mode, for reproducible shuffles.
    #[arg( long )]
    pub seed: Option<u64>,

    /// Start playing once the given files are queued.
    #[arg( short, long )]
    pub play: bool,

    /// Files or directories to add to the queue on startup.
    #[arg( trailing_var_arg = true )]
    pub files: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_files_and_flags() {
        let args = Args::parse_from( [ "tonearm", "--seed", "9", "-p", "a.mp3", "music/" ] );

        assert_eq!( args.seed, Some( 9 ) );
        assert!( args.play );
        assert_eq!( args.files, vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "music/" ) ] );
        assert!( args.state_dir.is_none() );
    }
}
