use std::time::Duration;

/// The configuration of the proximity and playback machinery
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a peer may go unseen before it is forgotten
    pub peer_staleness_in_seconds: f64,
    /// How often stale peers are swept out, independent of sighting traffic
    pub eviction_interval_in_seconds: f64,
    /// How often playback progress is recomputed and reported
    pub playback_tick_in_seconds: f64,
}

impl Config {
    /// How long a peer may go unseen before it is forgotten
    pub fn peer_staleness(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.peer_staleness_in_seconds * 1000.) as i64)
    }

    /// How often the eviction sweep runs
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs_f64(self.eviction_interval_in_seconds)
    }

    /// How often the playback clock ticks
    pub fn playback_tick_rate(&self) -> Duration {
        Duration::from_secs_f64(self.playback_tick_in_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // A minute without a sighting means the peer walked away
            peer_staleness_in_seconds: 60.,
            // Sweeping at half the staleness window keeps the visible set fresh
            eviction_interval_in_seconds: 30.,
            // 10 Hz is smooth enough for a progress bar
            playback_tick_in_seconds: 0.1,
        }
    }
}
