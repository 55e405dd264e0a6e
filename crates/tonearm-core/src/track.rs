//! Track metadata as seen by the playback controller.
//!
//! Tracks are compared by identifier only. Everything else is display data
//! carried along for the UI and for persistence.

use serde::{ Deserialize, Deserializer, Serialize };


/// Stable, unique track identifier.
pub type TrackId = String;


/// A playable item in the queue.
#[derive( Debug, Clone, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct Track {
    /// Unique identifier. Older snapshots stored numeric ids; those are
    /// normalised to their decimal string form on load.
    #[serde( deserialize_with = "deserialize_id" )]
    pub id: TrackId,

    /// Display name.
    pub name: String,

    /// Length in seconds.
    #[serde( default, deserialize_with = "deserialize_duration" )]
    pub duration: f64,

    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub cover: Option<String>,

    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub author: Option<String>,

    /// Opaque payload owned by whichever backend produced the track.
    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub extra_data: Option<serde_json::Value>,
}


impl Track {
    /// Creates a track with the required fields. Negative or non-finite
    /// durations are stored as zero.
    pub fn new( id: impl Into<TrackId>, name: impl Into<String>, duration: f64 ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration: sanitize_duration( duration ),
            cover: None,
            author: None,
            extra_data: None,
        }
    }


    pub fn with_author( mut self, author: impl Into<String> ) -> Self {
        self.author = Some( author.into() );
        self
    }


    pub fn with_cover( mut self, cover: impl Into<String> ) -> Self {
        self.cover = Some( cover.into() );
        self
    }


    pub fn with_extra_data( mut self, extra: serde_json::Value ) -> Self {
        self.extra_data = Some( extra );
        self
    }


    /// Returns true if both tracks share an identifier.
    pub fn same_as( &self, other: &Track ) -> bool {
        self.id == other.id
    }
}


impl PartialEq for Track {
    fn eq( &self, other: &Self ) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}


fn sanitize_duration( seconds: f64 ) -> f64 {
    if seconds.is_finite() && seconds > 0.0 { seconds } else { 0.0 }
}


fn deserialize_id<'de, D>( deserializer: D ) -> Result<TrackId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive( Deserialize )]
    #[serde( untagged )]
    enum RawId {
        Text( String ),
        Number( serde_json::Number ),
    }

    Ok( match RawId::deserialize( deserializer )? {
        RawId::Text( s ) => s,
        RawId::Number( n ) => n.to_string(),
    })
}


fn deserialize_duration<'de, D>( deserializer: D ) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize( deserializer )?;
    Ok( raw.map( sanitize_duration ).unwrap_or( 0.0 ) )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_equality_is_by_id() {
        let a = Track::new( "1", "First", 120.0 );
        let b = Track::new( "1", "Renamed", 30.0 ).with_author( "Someone" );
        let c = Track::new( "2", "First", 120.0 );

        assert_eq!( a, b );
        assert_ne!( a, c );
        assert!( a.same_as( &b ) );
    }


    #[test]
    fn test_negative_duration_clamped() {
        assert_eq!( Track::new( "x", "x", -5.0 ).duration, 0.0 );
        assert_eq!( Track::new( "x", "x", f64::NAN ).duration, 0.0 );
    }


    #[test]
    fn test_numeric_id_normalised() {
        let track: Track = serde_json::from_str(
            r#"{ "id": 42, "name": "Answer", "duration": 61.5 }"#
        ).unwrap();

        assert_eq!( track.id, "42" );
        assert_eq!( track.duration, 61.5 );
        assert!( track.author.is_none() );
    }


    #[test]
    fn test_wire_field_names() {
        let track = Track::new( "abc", "Song", 10.0 )
            .with_cover( "cover.jpg" )
            .with_extra_data( serde_json::json!( { "bvid": "BV1" } ) );
        let json = serde_json::to_value( &track ).unwrap();

        assert_eq!( json[ "extraData" ][ "bvid" ], "BV1" );
        assert_eq!( json[ "cover" ], "cover.jpg" );
        assert!( json.get( "author" ).is_none() );
    }


    #[test]
    fn test_missing_duration_defaults_to_zero() {
        let track: Track = serde_json::from_str( r#"{ "id": "a", "name": "A" }"# ).unwrap();
        assert_eq!( track.duration, 0.0 );
    }
}
