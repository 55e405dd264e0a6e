//! Play history tracking
//!
//! Chronological list of track identifiers, most recently started last.
//! Each identifier appears at most once.

use crate::track::TrackId;


/// Deduplicated, chronological play history.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct History {
    ids: Vec<TrackId>,
}


impl History {
    pub fn new() -> Self {
        Self::default()
    }


    /// Rebuilds history from a persisted list, keeping only the latest
    /// position of any repeated identifier.
    pub fn from_ids( ids: impl IntoIterator<Item = TrackId> ) -> Self {
        let mut history = Self::new();
        for id in ids {
            history.push( id );
        }
        history
    }


    /// Records a play start. An identifier already present moves to the end.
    pub fn push( &mut self, id: impl Into<TrackId> ) {
        let id = id.into();
        self.ids.retain( |existing| *existing != id );
        self.ids.push( id );
    }


    /// Drops every identifier in `ids`.
    pub fn remove<S: AsRef<str>>( &mut self, ids: &[S] ) {
        self.ids.retain( |existing| !ids.iter().any( |id| id.as_ref() == existing ) );
    }


    pub fn clear( &mut self ) {
        self.ids.clear();
    }


    pub fn contains( &self, id: &str ) -> bool {
        self.ids.iter().any( |existing| existing == id )
    }


    /// The identifier played right before `id`, if `id` is in history and
    /// is not the oldest entry.
    pub fn predecessor( &self, id: &str ) -> Option<&TrackId> {
        let index = self.ids.iter().position( |existing| existing == id )?;
        index.checked_sub( 1 ).and_then( |prev| self.ids.get( prev ) )
    }


    /// Most recent entry.
    pub fn last( &self ) -> Option<&TrackId> {
        self.ids.last()
    }


    /// All identifiers, oldest first.
    pub fn ids( &self ) -> &[TrackId] {
        &self.ids
    }


    pub fn len( &self ) -> usize {
        self.ids.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.ids.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_moves_repeat_to_end() {
        let mut history = History::new();
        history.push( "a" );
        history.push( "b" );
        history.push( "c" );
        history.push( "a" );

        assert_eq!( history.ids(), &[ "b", "c", "a" ] );
        assert_eq!( history.last().map( String::as_str ), Some( "a" ) );
    }


    #[test]
    fn test_predecessor() {
        let history = History::from_ids( [ "a".to_string(), "b".to_string(), "c".to_string() ] );

        assert_eq!( history.predecessor( "c" ).map( String::as_str ), Some( "b" ) );
        assert_eq!( history.predecessor( "b" ).map( String::as_str ), Some( "a" ) );
        assert_eq!( history.predecessor( "a" ), None );
        assert_eq!( history.predecessor( "missing" ), None );
    }


    #[test]
    fn test_from_ids_dedupes_keeping_latest() {
        let history = History::from_ids( [ "a", "b", "a" ].map( String::from ) );
        assert_eq!( history.ids(), &[ "b", "a" ] );
    }


    #[test]
    fn test_remove_and_clear() {
        let mut history = History::from_ids( [ "a", "b", "c" ].map( String::from ) );
        history.remove( &[ "b" ] );
        assert_eq!( history.ids(), &[ "a", "c" ] );
        assert!( !history.contains( "b" ) );

        history.clear();
        assert!( history.is_empty() );
    }
}
