use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use parking_lot::Mutex;
use thiserror::Error;

use nearplay_core::PlaybackSnapshot;

use crate::{
    util::random_session_id, CollabContext, CollabEvent, PlaybackCheckpoint, PlaylistError,
    PlaylistSource, SeedContext, SessionData, SessionMode, SessionPatch, SessionStore, StoreError,
    StoreSubscription,
};

#[derive(Debug, Error)]
pub enum SessionError {
    /// No caller identity, or the caller lacks permission for a venue-mode
    /// control action
    #[error("Authentication required")]
    AuthenticationRequired,
    #[error("Session {0} was not found")]
    SessionNotFound(String),
    /// A store or playlist-source call failed
    #[error("Upstream call failed: {0}")]
    Upstream(String),
}

impl From<PlaylistError> for SessionError {
    fn from(error: PlaylistError) -> Self {
        Self::Upstream(error.to_string())
    }
}

fn not_found_or_upstream(error: StoreError) -> SessionError {
    match error {
        StoreError::NotFound(id) => SessionError::SessionNotFound(id),
        error => SessionError::Upstream(error.to_string()),
    }
}

fn upstream(error: StoreError) -> SessionError {
    SessionError::Upstream(error.to_string())
}

/// The locally active session, kept in sync with the replicated document.
struct ActiveSession {
    data: SessionData,
    local_user_id: String,
    is_host: bool,
    subscription: StoreSubscription,
}

/// Owns the session lifecycle: creation, membership, host arbitration,
/// mood and exclusion mutation, and growing the playlist on demand.
///
/// Every mutating call takes the caller's identity explicitly. Remote calls
/// are awaited outside the snapshot lock, and pushed documents replace the
/// local snapshot whole, never field-by-field.
pub struct SessionManager<S, P> {
    context: CollabContext<S, P>,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl<S, P> SessionManager<S, P>
where
    S: SessionStore,
    P: PlaylistSource,
{
    pub fn new(context: &CollabContext<S, P>) -> Self {
        Self {
            context: context.clone(),
            active: Default::default(),
        }
    }

    /// Creates a new session with the caller as host and sole member, seeds
    /// its playlist, and makes it the active session.
    pub async fn create_session(
        &self,
        name: &str,
        host_user_id: &str,
        mode: SessionMode,
    ) -> Result<SessionData, SessionError> {
        if host_user_id.is_empty() {
            return Err(SessionError::AuthenticationRequired);
        }

        let now = Utc::now();

        let mut session = SessionData {
            id: random_session_id(20),
            name: name.to_string(),
            host_user_id: host_user_id.to_string(),
            mode,
            member_ids: vec![host_user_id.to_string()],
            playlist: vec![],
            current_track_index: None,
            mood_level: 0.5,
            excluded_genres: vec![],
            excluded_artists: vec![],
            playback: None,
            created_at: now,
            last_activity_at: now,
            revision: 0,
        };

        self.context
            .store
            .set(session.clone())
            .await
            .map_err(upstream)?;

        // The host is the only seed for the initial playlist
        let seed = SeedContext::from_session(&session);
        let playlist = self.context.playlists.generate(&seed).await?;

        session.playlist = playlist.clone();

        self.context
            .store
            .update(
                &session.id,
                SessionPatch {
                    playlist: Some(playlist),
                    last_activity_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .map_err(upstream)?;

        self.install_active(session.clone(), host_user_id);

        info!("Created session {} ({})", session.name, session.id);
        Ok(session)
    }

    /// Joins an existing session, appending the caller to its members when
    /// not already one, and makes it the active session.
    pub async fn join_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<SessionData, SessionError> {
        if user_id.is_empty() {
            return Err(SessionError::AuthenticationRequired);
        }

        let mut session = self
            .context
            .store
            .get(session_id)
            .await
            .map_err(not_found_or_upstream)?;

        if !session.member_ids.iter().any(|m| m == user_id) {
            session.member_ids.push(user_id.to_string());
            session.last_activity_at = Utc::now();

            self.context
                .store
                .update(
                    session_id,
                    SessionPatch {
                        member_ids: Some(session.member_ids.clone()),
                        last_activity_at: Some(session.last_activity_at),
                        ..Default::default()
                    },
                )
                .await
                .map_err(upstream)?;
        }

        self.install_active(session.clone(), user_id);

        info!("User {} joined session {}", user_id, session_id);
        Ok(session)
    }

    /// Leaves a session. The departing host hands the session to the first
    /// remaining member in stored order, and the last member to leave tears
    /// the document down. A document that is already gone counts as left.
    pub async fn leave_session(&self, session_id: &str, user_id: &str) -> Result<(), SessionError> {
        let session = match self.context.store.get(session_id).await {
            Ok(session) => Some(session),
            Err(StoreError::NotFound(_)) => None,
            Err(error) => return Err(upstream(error)),
        };

        if let Some(mut session) = session {
            let was_host = session.host_user_id == user_id;
            session.member_ids.retain(|m| m != user_id);

            if session.member_ids.is_empty() {
                match self.context.store.delete(session_id).await {
                    Ok(()) | Err(StoreError::NotFound(_)) => {}
                    Err(error) => return Err(upstream(error)),
                }

                self.context.emit(CollabEvent::SessionEnded {
                    session_id: session_id.to_string(),
                });
            } else {
                self.context
                    .store
                    .update(
                        session_id,
                        SessionPatch {
                            member_ids: Some(session.member_ids.clone()),
                            host_user_id: was_host.then(|| session.member_ids[0].clone()),
                            last_activity_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(upstream)?;
            }
        }

        self.clear_active_if(session_id);

        info!("User {} left session {}", user_id, session_id);
        Ok(())
    }

    /// Advances to the next track, growing the playlist through the playlist
    /// source when the stored one is exhausted.
    pub async fn skip_to_next_song(&self, user_id: &str) -> Result<(), SessionError> {
        let session = self.controlled_snapshot(user_id)?;
        let now = Utc::now();

        if let Some(next) = session.next_track_index() {
            return self
                .context
                .store
                .update(
                    &session.id,
                    SessionPatch {
                        current_track_index: Some(Some(next)),
                        last_activity_at: Some(now),
                        ..Default::default()
                    },
                )
                .await
                .map_err(not_found_or_upstream);
        }

        // The playlist is logically infinite, grown on demand
        let seed = SeedContext::from_session(&session);
        let new_tracks = self.context.playlists.generate(&seed).await?;

        if new_tracks.is_empty() {
            return Err(SessionError::Upstream(
                "playlist source returned no tracks".to_string(),
            ));
        }

        let next = session.playlist.len();
        let mut playlist = session.playlist;
        playlist.extend(new_tracks);

        self.context
            .store
            .update(
                &session.id,
                SessionPatch {
                    playlist: Some(playlist),
                    current_track_index: Some(Some(next)),
                    last_activity_at: Some(now),
                    ..Default::default()
                },
            )
            .await
            .map_err(not_found_or_upstream)
    }

    /// Adjusts the mood, clamped to [0, 1]. When the caller is the host, the
    /// upcoming playlist is regenerated in the background; that regeneration
    /// never fails the mood change itself.
    pub async fn adjust_mood(&self, user_id: &str, new_value: f64) -> Result<(), SessionError> {
        let session = self.controlled_snapshot(user_id)?;
        let mood_level = new_value.clamp(0., 1.);

        self.context
            .store
            .update(
                &session.id,
                SessionPatch {
                    mood_level: Some(mood_level),
                    last_activity_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .map_err(not_found_or_upstream)?;

        if session.host_user_id == user_id {
            self.regenerate_upcoming(SessionData {
                mood_level,
                ..session
            });
        }

        Ok(())
    }

    /// Adds a genre to the exclusion list. Already excluded genres are a no-op.
    pub async fn exclude_genre(&self, user_id: &str, genre: &str) -> Result<(), SessionError> {
        let session = self.controlled_snapshot(user_id)?;

        if session.excluded_genres.iter().any(|g| g == genre) {
            return Ok(());
        }

        let mut excluded_genres = session.excluded_genres;
        excluded_genres.push(genre.to_string());

        self.context
            .store
            .update(
                &session.id,
                SessionPatch {
                    excluded_genres: Some(excluded_genres),
                    last_activity_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .map_err(not_found_or_upstream)
    }

    /// Adds an artist to the exclusion list. Already excluded artists are a no-op.
    pub async fn exclude_artist(&self, user_id: &str, artist: &str) -> Result<(), SessionError> {
        let session = self.controlled_snapshot(user_id)?;

        if session.excluded_artists.iter().any(|a| a == artist) {
            return Ok(());
        }

        let mut excluded_artists = session.excluded_artists;
        excluded_artists.push(artist.to_string());

        self.context
            .store
            .update(
                &session.id,
                SessionPatch {
                    excluded_artists: Some(excluded_artists),
                    last_activity_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .map_err(not_found_or_upstream)
    }

    /// Commits a transport checkpoint for the current track, so every other
    /// device can extrapolate the same position. Does nothing when no track
    /// is current.
    pub async fn update_playback(
        &self,
        user_id: &str,
        position: f64,
        is_playing: bool,
    ) -> Result<(), SessionError> {
        let session = self.controlled_snapshot(user_id)?;

        let Some(track) = session.current_track() else {
            return Ok(());
        };

        let checkpoint = PlaybackCheckpoint {
            track_id: track.id.clone(),
            base_position: position.clamp(0., track.duration_seconds),
            is_playing,
            observed_at: Utc::now(),
            updated_by_user_id: user_id.to_string(),
        };

        self.context
            .store
            .update(
                &session.id,
                SessionPatch {
                    playback: Some(Some(checkpoint)),
                    last_activity_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .map_err(not_found_or_upstream)
    }

    /// The latest replicated snapshot of the active session, if any.
    pub fn current_session(&self) -> Option<SessionData> {
        self.active.lock().as_ref().map(|a| a.data.clone())
    }

    /// Whether the local user hosts the active session.
    pub fn is_host(&self) -> bool {
        self.active.lock().as_ref().map(|a| a.is_host).unwrap_or(false)
    }

    /// The clock tuple derived from the active session, if one can be.
    pub fn playback_snapshot(&self) -> Option<PlaybackSnapshot> {
        self.active
            .lock()
            .as_ref()
            .and_then(|a| a.data.playback_snapshot())
    }

    /// Makes the session the active one, replacing and cancelling any
    /// previous subscription.
    fn install_active(&self, data: SessionData, local_user_id: &str) {
        let subscription = self.subscribe_to(&data.id);

        {
            let mut active = self.active.lock();

            if let Some(previous) = active.take() {
                previous.subscription.cancel();
            }

            *active = Some(ActiveSession {
                is_host: data.host_user_id == local_user_id,
                local_user_id: local_user_id.to_string(),
                data: data.clone(),
                subscription,
            });
        }

        self.context.emit(CollabEvent::SessionChanged { session: data });
    }

    /// Begins listening to remote changes. A pushed document replaces the
    /// whole local snapshot atomically and recomputes `is_host`; pushes for a
    /// session that is no longer active, or arriving after cancellation, are
    /// ignored.
    fn subscribe_to(&self, session_id: &str) -> StoreSubscription {
        let active = self.active.clone();
        let context = self.context.clone();

        self.context.store.subscribe(
            session_id,
            Box::new(move |document| {
                {
                    let mut active = active.lock();

                    let Some(current) = active.as_mut() else {
                        return;
                    };

                    if current.data.id != document.id || current.subscription.is_cancelled() {
                        return;
                    }

                    current.is_host = document.host_user_id == current.local_user_id;
                    current.data = document.clone();
                }

                context.emit(CollabEvent::SessionChanged { session: document });
            }),
        )
    }

    fn clear_active_if(&self, session_id: &str) {
        {
            let mut active = self.active.lock();

            let matches = active
                .as_ref()
                .map(|current| current.data.id == session_id)
                .unwrap_or(false);

            if !matches {
                return;
            }

            if let Some(current) = active.take() {
                current.subscription.cancel();
            }
        }

        self.context.emit(CollabEvent::SessionLeft {
            session_id: session_id.to_string(),
        });
    }

    /// Clones the active snapshot after checking the 2-state control policy:
    /// anyone may mutate a roaming session, only the host a venue one.
    fn controlled_snapshot(&self, user_id: &str) -> Result<SessionData, SessionError> {
        let active = self.active.lock();

        let Some(current) = active.as_ref() else {
            return Err(SessionError::AuthenticationRequired);
        };

        let allowed = !user_id.is_empty()
            && (current.data.mode == SessionMode::Roaming
                || current.data.host_user_id == user_id);

        if !allowed {
            return Err(SessionError::AuthenticationRequired);
        }

        Ok(current.data.clone())
    }

    /// Replaces everything after the current track with freshly generated
    /// recommendations. Best-effort: failures are logged, never surfaced.
    fn regenerate_upcoming(&self, session: SessionData) {
        let context = self.context.clone();

        tokio::spawn(async move {
            let seed = SeedContext::from_session(&session);

            let new_tracks = match context.playlists.generate(&seed).await {
                Ok(tracks) => tracks,
                Err(error) => {
                    error!(
                        "Failed to regenerate playlist for session {}: {}",
                        session.id, error
                    );
                    return;
                }
            };

            let keep = session.current_track_index.map(|i| i + 1).unwrap_or(0);
            let mut playlist: Vec<_> = session.playlist.into_iter().take(keep).collect();
            playlist.extend(new_tracks);

            let result = context
                .store
                .update(
                    &session.id,
                    SessionPatch {
                        playlist: Some(playlist),
                        last_activity_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await;

            if let Err(error) = result {
                error!(
                    "Failed to persist regenerated playlist for session {}: {}",
                    session.id, error
                );
            }
        });
    }
}
