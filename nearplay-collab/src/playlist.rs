use async_trait::async_trait;
use thiserror::Error;

use crate::{SessionData, Track};

#[derive(Debug, Error)]
pub enum PlaylistError {
    /// The catalog or recommendation service could not be reached
    #[error("Failed to fetch recommendations: {0}")]
    FetchError(String),
}

/// Everything a playlist source may take into account when blending tracks
/// for the people in a session.
#[derive(Debug, Clone)]
pub struct SeedContext {
    pub member_ids: Vec<String>,
    pub mood_level: f64,
    pub excluded_genres: Vec<String>,
    pub excluded_artists: Vec<String>,
    /// Tracks the session has already seen, so the source can avoid duplicates
    pub previous_tracks: Vec<Track>,
}

impl SeedContext {
    pub fn from_session(session: &SessionData) -> Self {
        Self {
            member_ids: session.member_ids.clone(),
            mood_level: session.mood_level,
            excluded_genres: session.excluded_genres.clone(),
            excluded_artists: session.excluded_artists.clone(),
            previous_tracks: session.playlist.clone(),
        }
    }
}

/// Represents a type that can produce recommended tracks for a session.
///
/// Implementations typically talk to external catalog services and may fail;
/// the session layer treats any failure as an upstream error.
#[async_trait]
pub trait PlaylistSource
where
    Self: 'static + Sync + Send,
{
    async fn generate(&self, seed: &SeedContext) -> Result<Vec<Track>, PlaylistError>;
}
