use chrono::{DateTime, Utc};
use nearplay_core::PlaybackSnapshot;
use serde::{Deserialize, Serialize};

/// Who may change control-affecting fields of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Equal influence from all members
    Roaming,
    /// Only the host controls playback, mood, and exclusions
    Venue,
}

/// An immutable reference to a track in an external music catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration_seconds: f64,
    /// The catalog the track lives in. Example: spotify, applemusic
    pub source_service: String,
    /// The identifier used to play the track on its service
    pub source_uri: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub added_by_user_id: Option<String>,
}

/// The last transport checkpoint committed to the session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackCheckpoint {
    pub track_id: String,
    /// The position at the moment the checkpoint was taken, in seconds
    pub base_position: f64,
    pub is_playing: bool,
    pub observed_at: DateTime<Utc>,
    pub updated_by_user_id: String,
}

/// The shared listening-session document, the unit of replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    pub name: String,
    pub host_user_id: String,
    pub mode: SessionMode,
    /// Unique user ids. Stored order is kept so host reassignment is deterministic.
    pub member_ids: Vec<String>,
    pub playlist: Vec<Track>,
    pub current_track_index: Option<usize>,
    /// 0.0 is calm, 1.0 is energetic. Always within those bounds.
    pub mood_level: f64,
    pub excluded_genres: Vec<String>,
    pub excluded_artists: Vec<String>,
    /// The transport checkpoint, if anything has been played yet
    pub playback: Option<PlaybackCheckpoint>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Bumped by the store on every committed write
    #[serde(default)]
    pub revision: u64,
}

impl SessionData {
    pub fn current_track(&self) -> Option<&Track> {
        self.current_track_index.and_then(|i| self.playlist.get(i))
    }

    /// The index a skip would move to, if the playlist as stored allows one.
    /// A session with queued tracks but no current index starts at the front.
    pub fn next_track_index(&self) -> Option<usize> {
        let next = match self.current_track_index {
            Some(current) => current + 1,
            None => 0,
        };

        (next < self.playlist.len()).then_some(next)
    }

    /// Derives the clock tuple from the stored checkpoint and playlist.
    ///
    /// Returns None when there is no checkpoint, or when the checkpoint
    /// references a track that is no longer in the playlist.
    pub fn playback_snapshot(&self) -> Option<PlaybackSnapshot> {
        let checkpoint = self.playback.as_ref()?;

        let track = self
            .playlist
            .iter()
            .find(|t| t.id == checkpoint.track_id)?;

        Some(PlaybackSnapshot {
            track_id: checkpoint.track_id.clone(),
            duration_seconds: track.duration_seconds,
            base_position: checkpoint.base_position,
            is_playing: checkpoint.is_playing,
            observed_at: checkpoint.observed_at,
            updated_by_user_id: Some(checkpoint.updated_by_user_id.clone()),
        })
    }
}
