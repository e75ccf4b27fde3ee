use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam::atomic::AtomicCell;

/// A cancellable periodic task running on its own thread.
///
/// Cancelling twice is a no-op, and dropping the ticker cancels it.
pub struct Ticker {
    cancelled: Arc<AtomicCell<bool>>,
}

impl Ticker {
    /// Spawns a thread that invokes `tick` at the given fixed cadence.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let cancelled: Arc<AtomicCell<bool>> = Default::default();

        let run = {
            let cancelled = cancelled.clone();

            move || {
                let mut next = Instant::now();

                loop {
                    if cancelled.load() {
                        break;
                    }

                    tick();

                    next += interval;
                    spin_sleep::sleep(next.saturating_duration_since(Instant::now()));
                }
            }
        };

        thread::spawn(run);

        Self { cancelled }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel()
    }
}
