use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

pub type ChangeCallback = Box<dyn Fn(SessionData) + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The session document doesn't exist
    #[error("Session document {0} doesn't exist")]
    NotFound(String),
    /// An unknown or internal error happened with the store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

/// Represents a replicated key-document store scoped to session documents.
///
/// Writes are field-level patches so members editing different fields
/// concurrently do not clobber each other. Change notifications always carry
/// the full committed document.
#[async_trait]
pub trait SessionStore
where
    Self: 'static + Sync + Send,
{
    async fn get(&self, session_id: &str) -> Result<SessionData, StoreError>;
    async fn set(&self, session: SessionData) -> Result<(), StoreError>;
    async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<(), StoreError>;
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    /// Registers a callback invoked with every committed version of the
    /// document until the returned subscription is cancelled.
    fn subscribe(&self, session_id: &str, on_change: ChangeCallback) -> StoreSubscription;
}

/// A handle to an active change subscription.
///
/// Cancelling is idempotent, and a cancelled subscription never delivers
/// another change.
#[derive(Debug, Clone, Default)]
pub struct StoreSubscription {
    cancelled: Arc<AtomicCell<bool>>,
}

impl StoreSubscription {
    pub fn cancel(&self) {
        self.cancelled.store(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load()
    }
}

/// The fields of a session document a single write may change.
///
/// Unset fields are left untouched by the store, which is what keeps
/// concurrent writers from different members out of each other's way.
#[derive(Debug, Default, Clone)]
pub struct SessionPatch {
    pub member_ids: Option<Vec<String>>,
    pub host_user_id: Option<String>,
    pub playlist: Option<Vec<Track>>,
    pub current_track_index: Option<Option<usize>>,
    pub mood_level: Option<f64>,
    pub excluded_genres: Option<Vec<String>>,
    pub excluded_artists: Option<Vec<String>>,
    pub playback: Option<Option<PlaybackCheckpoint>>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// A patch that only bumps the activity timestamp.
    pub fn touch(now: DateTime<Utc>) -> Self {
        Self {
            last_activity_at: Some(now),
            ..Default::default()
        }
    }

    /// Applies the set fields to a document. Store implementations translate
    /// this to their native partial-update mechanism.
    pub fn apply_to(&self, session: &mut SessionData) {
        if let Some(member_ids) = &self.member_ids {
            session.member_ids = member_ids.clone();
        }

        if let Some(host_user_id) = &self.host_user_id {
            session.host_user_id = host_user_id.clone();
        }

        if let Some(playlist) = &self.playlist {
            session.playlist = playlist.clone();
        }

        if let Some(current_track_index) = self.current_track_index {
            session.current_track_index = current_track_index;
        }

        if let Some(mood_level) = self.mood_level {
            session.mood_level = mood_level;
        }

        if let Some(excluded_genres) = &self.excluded_genres {
            session.excluded_genres = excluded_genres.clone();
        }

        if let Some(excluded_artists) = &self.excluded_artists {
            session.excluded_artists = excluded_artists.clone();
        }

        if let Some(playback) = &self.playback {
            session.playback = playback.clone();
        }

        if let Some(last_activity_at) = self.last_activity_at {
            session.last_activity_at = last_activity_at;
        }
    }
}
