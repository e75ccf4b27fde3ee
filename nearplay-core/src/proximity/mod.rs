use std::sync::Arc;

use chrono::{DateTime, Utc};

mod radio;
mod registry;
mod signal;

pub use radio::*;
pub use registry::*;
pub use signal::*;

use crate::{CoreContext, Ticker};

/// The proximity system, wiring the radio coordinator, the discovery registry,
/// and the periodic eviction sweep together.
pub struct Proximity<M> {
    registry: Arc<DiscoveryRegistry>,
    coordinator: RadioCoordinator<M>,

    /// Sweeps stale peers out on a fixed cadence, independent of sighting traffic
    _eviction: Ticker,
}

impl<M> Proximity<M>
where
    M: RadioMedium,
{
    pub fn new(context: &CoreContext, medium: Arc<M>) -> Self {
        let registry = Arc::new(DiscoveryRegistry::new(context));
        let coordinator = RadioCoordinator::new(context, medium, registry.clone());

        let eviction = {
            let registry = registry.clone();

            Ticker::spawn(context.config.eviction_interval(), move || {
                registry.evict_stale(Utc::now())
            })
        };

        Self {
            registry,
            coordinator,
            _eviction: eviction,
        }
    }

    pub fn start_scanning(&self) -> Result<(), RadioError> {
        self.coordinator.start_scanning()
    }

    pub fn stop_scanning(&self) {
        self.coordinator.stop_scanning()
    }

    pub fn start_advertising(
        &self,
        user_id: String,
        session_id: Option<String>,
    ) -> Result<(), RadioError> {
        self.coordinator.start_advertising(user_id, session_id)
    }

    pub fn stop_advertising(&self) {
        self.coordinator.stop_advertising()
    }

    pub fn radio_state(&self) -> RadioState {
        self.coordinator.state()
    }

    /// Inbound power transition from the platform radio.
    pub fn handle_power_state(&self, new_state: RadioState) {
        self.coordinator.handle_power_state(new_state)
    }

    /// Inbound advertisement sighting from the platform radio.
    pub fn handle_sighting(
        &self,
        device_id: &str,
        display_name: &str,
        payload: &[u8],
        signal_raw: i32,
        now: DateTime<Utc>,
    ) {
        self.coordinator
            .handle_sighting(device_id, display_name, payload, signal_raw, now)
    }

    /// The currently visible peers.
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.registry.peers()
    }

    /// The distinct session ids advertised by visible peers.
    pub fn nearby_session_ids(&self) -> Vec<String> {
        self.registry.nearby_session_ids()
    }
}
