mod events;
mod playlist;
mod sessions;
mod store;
mod util;

use std::sync::Arc;

use crossbeam::channel::unbounded;

pub use events::*;
pub use playlist::*;
pub use sessions::*;
pub use store::*;

use nearplay_core::{
    Config, CoreContext, CoreEvent, CoreEventReceiver, PlaybackClock, Proximity, RadioMedium,
};

/// The nearplay collab system, facilitating proximity discovery, shared
/// session state, and synchronized playback.
pub struct Nearplay<S, P, M> {
    pub sessions: SessionManager<S, P>,
    pub proximity: Proximity<M>,
    pub playback: PlaybackClock,

    core_event_receiver: CoreEventReceiver,
    collab_event_receiver: CollabEventReceiver,
}

/// A type passed to various components of the collab system, to access the
/// collaborators and emit events.
pub struct CollabContext<S, P> {
    pub store: Arc<S>,
    pub playlists: Arc<P>,

    event_sender: CollabEventSender,
}

impl<S, P, M> Nearplay<S, P, M>
where
    S: SessionStore,
    P: PlaylistSource,
    M: RadioMedium,
{
    pub fn new(config: Config, store: S, playlists: P, medium: M) -> Self {
        let (core_context, core_event_receiver) = CoreContext::new(config);
        let (collab_context, collab_event_receiver) =
            CollabContext::new(Arc::new(store), Arc::new(playlists));

        Self {
            sessions: SessionManager::new(&collab_context),
            proximity: Proximity::new(&core_context, Arc::new(medium)),
            playback: PlaybackClock::new(&core_context),

            core_event_receiver,
            collab_event_receiver,
        }
    }

    /// Receive events from the core: proximity changes and playback ticks.
    pub fn wait_for_core_event(&self) -> CoreEvent {
        self.core_event_receiver
            .recv()
            .expect("event is received without error")
    }

    /// Receive events from the session layer.
    pub fn wait_for_collab_event(&self) -> CollabEvent {
        self.collab_event_receiver
            .recv()
            .expect("event is received without error")
    }

    /// Keeps the local playback clock in step with the replicated session.
    /// The consuming shell calls this for every collab event it drains.
    pub fn handle_collab_event(&self, event: &CollabEvent) {
        match event {
            CollabEvent::SessionChanged { session } => {
                if let Some(snapshot) = session.playback_snapshot() {
                    self.playback.sync_to(snapshot);
                }
            }
            CollabEvent::SessionLeft { .. } | CollabEvent::SessionEnded { .. } => {
                self.playback.clear();
            }
        }
    }

    /// Reacts to the clock finishing a track by advancing the shared session.
    ///
    /// Every member's clock crosses the boundary at roughly the same time,
    /// so only the host commits the skip and the index moves once.
    pub async fn handle_core_event(
        &self,
        event: &CoreEvent,
        local_user_id: &str,
    ) -> Result<(), SessionError> {
        if let CoreEvent::TrackFinished { .. } = event {
            if self.sessions.is_host() {
                self.sessions.skip_to_next_song(local_user_id).await?;
            }
        }

        Ok(())
    }
}

impl<S, P> CollabContext<S, P>
where
    S: SessionStore,
    P: PlaylistSource,
{
    pub fn new(store: Arc<S>, playlists: Arc<P>) -> (Self, CollabEventReceiver) {
        let (event_sender, event_receiver) = unbounded();

        (
            Self {
                store,
                playlists,
                event_sender,
            },
            event_receiver,
        )
    }

    pub fn emit(&self, event: CollabEvent) {
        // Nothing to do when no one is listening anymore
        let _ = self.event_sender.send(event);
    }
}

impl<S, P> Clone for CollabContext<S, P>
where
    S: SessionStore,
    P: PlaylistSource,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            playlists: self.playlists.clone(),
            event_sender: self.event_sender.clone(),
        }
    }
}
