use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{CoreContext, CoreEvent, Ticker};

/// The last-known playback checkpoint of a session.
///
/// Devices never stream a continuous position to each other. They exchange
/// this tuple and each extrapolate their own position from it, which bounds
/// cross-device drift by replication latency.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub track_id: String,
    pub duration_seconds: f64,
    /// The position at the moment the checkpoint was taken, in seconds.
    pub base_position: f64,
    pub is_playing: bool,
    pub observed_at: DateTime<Utc>,
    pub updated_by_user_id: Option<String>,
}

impl PlaybackSnapshot {
    /// The extrapolated position at `now`, clamped to the track bounds.
    pub fn position_at(&self, now: DateTime<Utc>) -> f64 {
        let position = if self.is_playing {
            let elapsed = (now - self.observed_at).num_milliseconds() as f64 / 1000.;
            self.base_position + elapsed
        } else {
            self.base_position
        };

        position.clamp(0., self.duration_seconds)
    }
}

#[derive(Debug, Default)]
struct ClockState {
    track: Option<ActiveTrack>,
}

#[derive(Debug)]
struct ActiveTrack {
    snapshot: PlaybackSnapshot,
    /// Ensures the finish signal fires once per boundary crossing
    finished_emitted: bool,
}

/// Computes the extrapolated playback position of the active track and drives
/// local auto-advance through a fixed-cadence tick.
///
/// The clock is purely local per device. It reads immutable snapshots it was
/// handed and is never replicated itself.
pub struct PlaybackClock {
    context: CoreContext,
    state: Arc<Mutex<ClockState>>,
    ticker: Mutex<Option<Ticker>>,
}

impl PlaybackClock {
    pub fn new(context: &CoreContext) -> Self {
        Self {
            context: context.clone(),
            state: Default::default(),
            ticker: Default::default(),
        }
    }

    /// Starts playing a track from the beginning.
    pub fn play(&self, track_id: String, duration_seconds: f64, now: DateTime<Utc>) {
        self.state.lock().track = Some(ActiveTrack {
            snapshot: PlaybackSnapshot {
                track_id,
                duration_seconds,
                base_position: 0.,
                is_playing: true,
                observed_at: now,
                updated_by_user_id: None,
            },
            finished_emitted: false,
        });
    }

    /// Freezes the position at its current extrapolation.
    pub fn pause(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();

        if let Some(track) = &mut state.track {
            track.snapshot.base_position = track.snapshot.position_at(now);
            track.snapshot.observed_at = now;
            track.snapshot.is_playing = false;
        }
    }

    /// Resumes playback from the frozen position, restarting extrapolation
    /// at `now`.
    pub fn resume(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();

        if let Some(track) = &mut state.track {
            track.snapshot.observed_at = now;
            track.snapshot.is_playing = true;
        }
    }

    /// Adopts a checkpoint received from the session, replacing local state.
    pub fn sync_to(&self, snapshot: PlaybackSnapshot) {
        let finished = !snapshot.is_playing && snapshot.base_position >= snapshot.duration_seconds;

        self.state.lock().track = Some(ActiveTrack {
            snapshot,
            finished_emitted: finished,
        });
    }

    /// Forgets the active track.
    pub fn clear(&self) {
        self.state.lock().track = None;
    }

    /// Returns the extrapolated position at `now`, if a track is active.
    pub fn position_at(&self, now: DateTime<Utc>) -> Option<f64> {
        self.state
            .lock()
            .track
            .as_ref()
            .map(|t| t.snapshot.position_at(now))
    }

    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        self.state.lock().track.as_ref().map(|t| t.snapshot.clone())
    }

    pub fn is_playing(&self) -> bool {
        self.state
            .lock()
            .track
            .as_ref()
            .map(|t| t.snapshot.is_playing)
            .unwrap_or(false)
    }

    /// Starts the periodic tick that reports progress and fires auto-advance.
    /// Restarting an already running ticker replaces it.
    pub fn start_ticker(&self) {
        let ticker = {
            let context = self.context.clone();
            let state = self.state.clone();

            Ticker::spawn(self.context.config.playback_tick_rate(), move || {
                Self::process(&context, &state, Utc::now())
            })
        };

        *self.ticker.lock() = Some(ticker);
    }

    /// Stops the periodic tick. Stopping twice is a no-op.
    pub fn stop_ticker(&self) {
        self.ticker.lock().take();
    }

    /// A single tick: recompute progress, detect the end of the track,
    /// auto-pause and signal the finish exactly once.
    pub fn tick(&self, now: DateTime<Utc>) {
        Self::process(&self.context, &self.state, now);
    }

    fn process(context: &CoreContext, state: &Mutex<ClockState>, now: DateTime<Utc>) {
        let mut state = state.lock();

        let Some(track) = &mut state.track else {
            return;
        };

        let position = track.snapshot.position_at(now);

        context.emit(CoreEvent::PlaybackTimeUpdate {
            position,
            duration: track.snapshot.duration_seconds,
        });

        let crossed_end = track.snapshot.is_playing
            && position >= track.snapshot.duration_seconds
            && !track.finished_emitted;

        if crossed_end {
            track.snapshot.base_position = track.snapshot.duration_seconds;
            track.snapshot.observed_at = now;
            track.snapshot.is_playing = false;
            track.finished_emitted = true;

            context.emit(CoreEvent::TrackFinished {
                track_id: track.snapshot.track_id.clone(),
            });
        }
    }
}
