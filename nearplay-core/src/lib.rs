use crossbeam::channel::unbounded;

mod config;
mod events;
mod playback;
mod proximity;

pub use config::*;
pub use events::*;
pub use playback::*;
pub use proximity::*;

/// A type passed to the components of the core, to access config and emit events.
#[derive(Clone)]
pub struct CoreContext {
    pub config: Config,
    event_sender: CoreEventSender,
}

impl CoreContext {
    /// Creates a context and the receiving end of its event stream.
    pub fn new(config: Config) -> (Self, CoreEventReceiver) {
        let (event_sender, event_receiver) = unbounded();

        (
            Self {
                config,
                event_sender,
            },
            event_receiver,
        )
    }

    pub fn emit(&self, event: CoreEvent) {
        // Nothing to do when no one is listening anymore
        let _ = self.event_sender.send(event);
    }
}

// Realistically, the context should always be created together with a receiver.
// However, in a test, the events are often irrelevant.
#[cfg(test)]
impl Default for CoreContext {
    fn default() -> Self {
        let (context, _) = Self::new(Config::default());
        context
    }
}
