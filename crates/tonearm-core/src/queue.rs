//! Play queue management
//!
//! An ordered list of tracks, unique by identifier. Adding a track that is
//! already queued moves it instead of duplicating it.

use crate::track::{ Track, TrackId };


/// Result of [`Queue::insert_next`].
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum InsertNext {
    /// The track now sits at this index, right after the current track.
    Inserted { index: usize },

    /// The current track is at the head of the queue. The track was taken
    /// out of its old position (if it had one) but not re-inserted.
    CurrentAtHead,

    /// The current track is not in the queue. Nothing changed.
    CurrentMissing,
}


/// Ordered, identifier-deduplicated track queue.
#[derive( Debug, Clone, Default, PartialEq )]
pub struct Queue {
    tracks: Vec<Track>,
}


impl Queue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }


    /// Builds a queue from a list that may contain duplicates. The last
    /// occurrence of each identifier wins, as if each had been enqueued in
    /// order.
    pub fn from_tracks( tracks: impl IntoIterator<Item = Track> ) -> Self {
        let mut queue = Self::new();
        queue.enqueue( tracks );
        queue
    }


    /// Appends tracks, removing any earlier entry with the same identifier
    /// first.
    ///
    /// @returns The number of tracks appended
    pub fn enqueue( &mut self, tracks: impl IntoIterator<Item = Track> ) -> usize {
        let mut added = 0;
        for track in tracks {
            self.tracks.retain( |t| t.id != track.id );
            self.tracks.push( track );
            added += 1;
        }
        added
    }


    /// Removes every track whose identifier is in `ids`.
    ///
    /// @returns The number of tracks removed
    pub fn remove<S: AsRef<str>>( &mut self, ids: &[S] ) -> usize {
        let before = self.tracks.len();
        self.tracks.retain( |t| !ids.iter().any( |id| id.as_ref() == t.id ) );
        before - self.tracks.len()
    }


    /// Clears the queue.
    pub fn clear( &mut self ) {
        self.tracks.clear();
    }


    /// Places `track` right after the track identified by `current`.
    ///
    /// The position of `current` is looked up in the queue with `track`
    /// already filtered out, so re-inserting a queued track moves it.
    pub fn insert_next( &mut self, track: Track, current: &str ) -> InsertNext {
        let mut view: Vec<Track> = self.tracks.iter()
            .filter( |t| t.id != track.id )
            .cloned()
            .collect();

        match view.iter().position( |t| t.id == current ) {
            None => InsertNext::CurrentMissing,
            Some( 0 ) => {
                self.tracks = view;
                InsertNext::CurrentAtHead
            }
            Some( index ) => {
                view.insert( index + 1, track );
                self.tracks = view;
                InsertNext::Inserted { index: index + 1 }
            }
        }
    }


    /// Returns the entry that follows `id` in queue order.
    ///
    /// If `id` is not queued the first entry is returned. At the end of the
    /// queue the result wraps to the first entry when `wrap` is set and is
    /// `None` otherwise.
    pub fn successor( &self, id: &str, wrap: bool ) -> Option<&Track> {
        match self.position( id ) {
            None => self.tracks.first(),
            Some( index ) if index + 1 < self.tracks.len() => self.tracks.get( index + 1 ),
            Some( _ ) if wrap => self.tracks.first(),
            Some( _ ) => None,
        }
    }


    /// Gets the index of a track by identifier.
    pub fn position( &self, id: &str ) -> Option<usize> {
        self.tracks.iter().position( |t| t.id == id )
    }


    /// Looks up a track by identifier.
    pub fn find( &self, id: &str ) -> Option<&Track> {
        self.tracks.iter().find( |t| t.id == id )
    }


    pub fn contains( &self, id: &str ) -> bool {
        self.position( id ).is_some()
    }


    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    pub fn first( &self ) -> Option<&Track> {
        self.tracks.first()
    }


    /// Gets all tracks in queue order.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    pub fn iter( &self ) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }


    /// Identifiers in queue order.
    pub fn ids( &self ) -> Vec<TrackId> {
        self.tracks.iter().map( |t| t.id.clone() ).collect()
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn track( id: &str ) -> Track {
        Track::new( id, format!( "Track {}", id ), 180.0 )
    }


    fn queue_of( ids: &[&str] ) -> Queue {
        Queue::from_tracks( ids.iter().map( |id| track( id ) ) )
    }


    #[test]
    fn test_enqueue_moves_existing_to_end() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        let added = queue.enqueue( [ track( "a" ) ] );

        assert_eq!( added, 1 );
        assert_eq!( queue.ids(), vec![ "b", "c", "a" ] );
    }


    #[test]
    fn test_enqueue_batch_with_duplicates() {
        let mut queue = queue_of( &[ "a" ] );
        queue.enqueue( [ track( "b" ), track( "a" ), track( "b" ) ] );

        assert_eq!( queue.ids(), vec![ "a", "b" ] );
    }


    #[test]
    fn test_from_tracks_last_occurrence_wins() {
        let queue = queue_of( &[ "a", "b", "a" ] );
        assert_eq!( queue.ids(), vec![ "b", "a" ] );
    }


    #[test]
    fn test_remove_filters_ids() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        let removed = queue.remove( &[ "a", "c", "zzz" ] );

        assert_eq!( removed, 2 );
        assert_eq!( queue.ids(), vec![ "b" ] );
    }


    #[test]
    fn test_insert_next_after_current() {
        let mut queue = queue_of( &[ "a", "b", "c", "d" ] );
        let result = queue.insert_next( track( "x" ), "b" );

        assert_eq!( result, InsertNext::Inserted { index: 2 } );
        assert_eq!( queue.ids(), vec![ "a", "b", "x", "c", "d" ] );
    }


    #[test]
    fn test_insert_next_moves_queued_track() {
        let mut queue = queue_of( &[ "a", "b", "c", "d" ] );
        let result = queue.insert_next( track( "d" ), "b" );

        assert_eq!( result, InsertNext::Inserted { index: 2 } );
        assert_eq!( queue.ids(), vec![ "a", "b", "d", "c" ] );
    }


    #[test]
    fn test_insert_next_index_shift_after_removal() {
        // "a" sits before current, so current's index in the filtered view
        // is one lower than in the raw queue.
        let mut queue = queue_of( &[ "a", "b", "c", "d" ] );
        let result = queue.insert_next( track( "a" ), "c" );

        assert_eq!( result, InsertNext::Inserted { index: 2 } );
        assert_eq!( queue.ids(), vec![ "b", "c", "a", "d" ] );
    }


    #[test]
    fn test_insert_next_current_at_head() {
        let mut queue = queue_of( &[ "a", "b", "c" ] );
        let result = queue.insert_next( track( "c" ), "a" );

        assert_eq!( result, InsertNext::CurrentAtHead );
        assert_eq!( queue.ids(), vec![ "a", "b" ] );

        let result = queue.insert_next( track( "new" ), "a" );
        assert_eq!( result, InsertNext::CurrentAtHead );
        assert_eq!( queue.ids(), vec![ "a", "b" ] );
    }


    #[test]
    fn test_insert_next_current_missing() {
        let mut queue = queue_of( &[ "a", "b" ] );
        let result = queue.insert_next( track( "b" ), "gone" );

        assert_eq!( result, InsertNext::CurrentMissing );
        assert_eq!( queue.ids(), vec![ "a", "b" ] );
    }


    #[test]
    fn test_successor() {
        let queue = queue_of( &[ "a", "b", "c" ] );

        assert_eq!( queue.successor( "a", false ).map( |t| t.id.as_str() ), Some( "b" ) );
        assert_eq!( queue.successor( "c", false ), None );
        assert_eq!( queue.successor( "c", true ).map( |t| t.id.as_str() ), Some( "a" ) );
        assert_eq!( queue.successor( "missing", false ).map( |t| t.id.as_str() ), Some( "a" ) );
        assert_eq!( Queue::new().successor( "a", true ), None );
    }
}
