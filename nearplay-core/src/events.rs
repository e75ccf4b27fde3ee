use crossbeam::channel::{Receiver, Sender};

use crate::{DiscoveredPeer, RadioState};

pub type CoreEventSender = Sender<CoreEvent>;
pub type CoreEventReceiver = Receiver<CoreEvent>;

/// Describes the events that can be emitted by the core.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The set of visible peers changed, either from a sighting or an eviction.
    PeersChanged {
        /// The new visible set.
        peers: Vec<DiscoveredPeer>,
    },
    /// The radio's power or permission state changed.
    RadioStateChanged { new_state: RadioState },
    /// The radio left the powered-on state while scanning or advertising was active.
    /// Both are force-stopped on the medium when this is emitted.
    RadioUnavailable { state: RadioState },
    /// The playback clock recomputed the displayed progress.
    PlaybackTimeUpdate {
        /// The current position of the track, in seconds.
        position: f64,
        /// The length of the track, in seconds.
        duration: f64,
    },
    /// The clock reached the end of a track and auto-paused.
    /// Emitted exactly once per boundary crossing.
    TrackFinished { track_id: String },
}
