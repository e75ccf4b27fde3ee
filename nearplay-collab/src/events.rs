use crossbeam::channel::{Receiver, Sender};

use crate::SessionData;

pub type CollabEventSender = Sender<CollabEvent>;
pub type CollabEventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// The active session's replicated snapshot changed, either from a local
    /// operation or a remote member's committed write.
    SessionChanged { session: SessionData },
    /// The local user left a session.
    SessionLeft { session_id: String },
    /// A session's last member left and its document was deleted.
    SessionEnded { session_id: String },
}
