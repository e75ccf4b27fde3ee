use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CoreContext, CoreEvent, DiscoveryRegistry, Sighting};

/// The power and permission state of the underlying platform radio.
/// Transitions are externally driven, never computed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    Resetting,
    Unauthorized,
    Unsupported,
}

#[derive(Debug, Error)]
pub enum RadioError {
    /// The medium is powered off, unauthorized, or unsupported
    #[error("Radio is unavailable in state {0:?}")]
    Unavailable(RadioState),
}

/// The short payload broadcast over the medium, so peers can learn who is
/// advertising and which session they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisePayload {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AdvertisePayload {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("payload serializes")
    }

    /// Decodes a received payload. Foreign or corrupt advertisements return None.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// The outbound intents a platform radio must be able to carry out.
///
/// Implementors are expected to tolerate redundant calls, since intents are
/// re-applied whenever the radio regains power.
pub trait RadioMedium
where
    Self: 'static + Sync + Send,
{
    fn set_scanning(&self, enabled: bool);
    fn set_advertising(&self, payload: Option<Vec<u8>>);
}

/// What the operator wants the radio to be doing, regardless of whether the
/// radio can currently do it.
#[derive(Debug, Default, Clone)]
struct RadioIntent {
    scanning: bool,
    advertising: Option<AdvertisePayload>,
}

impl RadioIntent {
    fn is_active(&self) -> bool {
        self.scanning || self.advertising.is_some()
    }
}

/// Drives the scan/advertise lifecycle against the discovery medium and feeds
/// every parseable sighting into the [DiscoveryRegistry].
pub struct RadioCoordinator<M> {
    context: CoreContext,
    medium: Arc<M>,
    registry: Arc<DiscoveryRegistry>,
    state: AtomicCell<RadioState>,
    intent: Mutex<RadioIntent>,
}

impl<M> RadioCoordinator<M>
where
    M: RadioMedium,
{
    pub fn new(context: &CoreContext, medium: Arc<M>, registry: Arc<DiscoveryRegistry>) -> Self {
        Self {
            context: context.clone(),
            medium,
            registry,
            state: Default::default(),
            intent: Default::default(),
        }
    }

    pub fn state(&self) -> RadioState {
        self.state.load()
    }

    /// Starts scanning for nearby advertisements.
    ///
    /// The intent is recorded even when the radio is unavailable, so scanning
    /// resumes on its own once the radio powers back on.
    pub fn start_scanning(&self) -> Result<(), RadioError> {
        self.intent.lock().scanning = true;

        self.when_powered_on(|| self.medium.set_scanning(true))
    }

    pub fn stop_scanning(&self) {
        self.intent.lock().scanning = false;
        self.medium.set_scanning(false);
    }

    /// Starts advertising the local user, and the session if one was given.
    /// Like scanning, the intent survives power loss.
    pub fn start_advertising(
        &self,
        user_id: String,
        session_id: Option<String>,
    ) -> Result<(), RadioError> {
        let payload = AdvertisePayload {
            user_id,
            session_id,
        };

        self.intent.lock().advertising = Some(payload.clone());

        self.when_powered_on(|| self.medium.set_advertising(Some(payload.encode())))
    }

    pub fn stop_advertising(&self) {
        self.intent.lock().advertising = None;
        self.medium.set_advertising(None);
    }

    /// Called by the platform layer whenever the radio's own state changes.
    pub fn handle_power_state(&self, new_state: RadioState) {
        let old_state = self.state.swap(new_state);

        if old_state == new_state {
            return;
        }

        info!("Radio state changed from {:?} to {:?}", old_state, new_state);
        self.context.emit(CoreEvent::RadioStateChanged { new_state });

        let intent = self.intent.lock().clone();

        if new_state == RadioState::PoweredOn {
            // The operator intent outlives power loss, so pick up where we left off.
            if intent.scanning {
                self.medium.set_scanning(true);
            }

            if let Some(payload) = &intent.advertising {
                self.medium.set_advertising(Some(payload.encode()));
            }

            return;
        }

        if intent.is_active() {
            warn!("Radio became unavailable while active, stopping scan/advertise");

            self.medium.set_scanning(false);
            self.medium.set_advertising(None);

            self.context
                .emit(CoreEvent::RadioUnavailable { state: new_state });
        }
    }

    /// Called by the platform layer for every advertisement observed on the
    /// medium. Unparseable or foreign payloads are dropped without error.
    pub fn handle_sighting(
        &self,
        device_id: &str,
        display_name: &str,
        payload: &[u8],
        signal_raw: i32,
        now: DateTime<Utc>,
    ) {
        let Some(decoded) = AdvertisePayload::decode(payload) else {
            debug!("Dropping unparseable advertisement from {}", device_id);
            return;
        };

        self.registry.record_sighting(
            Sighting {
                device_id: device_id.to_string(),
                display_name: display_name.to_string(),
                signal_raw,
                observed_user_id: Some(decoded.user_id),
                observed_session_id: decoded.session_id,
            },
            now,
        );
    }

    fn when_powered_on<F>(&self, apply: F) -> Result<(), RadioError>
    where
        F: FnOnce(),
    {
        let state = self.state.load();

        if state != RadioState::PoweredOn {
            return Err(RadioError::Unavailable(state));
        }

        apply();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeMedium {
        scanning: AtomicCell<bool>,
        advertised: Mutex<Option<Vec<u8>>>,
    }

    impl RadioMedium for FakeMedium {
        fn set_scanning(&self, enabled: bool) {
            self.scanning.store(enabled);
        }

        fn set_advertising(&self, payload: Option<Vec<u8>>) {
            *self.advertised.lock() = payload;
        }
    }

    fn coordinator() -> (RadioCoordinator<FakeMedium>, Arc<FakeMedium>) {
        let context = CoreContext::default();
        let medium = Arc::new(FakeMedium::default());
        let registry = Arc::new(DiscoveryRegistry::new(&context));

        (
            RadioCoordinator::new(&context, medium.clone(), registry),
            medium,
        )
    }

    #[test]
    fn test_scanning_requires_power() {
        let (coordinator, medium) = coordinator();

        let result = coordinator.start_scanning();
        assert!(matches!(
            result,
            Err(RadioError::Unavailable(RadioState::Unknown))
        ));
        assert!(!medium.scanning.load());

        // The intent was retained, so powering on resumes the scan
        coordinator.handle_power_state(RadioState::PoweredOn);
        assert!(medium.scanning.load());
    }

    #[test]
    fn test_power_loss_force_stops() {
        let (coordinator, medium) = coordinator();

        coordinator.handle_power_state(RadioState::PoweredOn);
        coordinator.start_scanning().expect("scanning starts");
        coordinator
            .start_advertising("user-1".to_string(), None)
            .expect("advertising starts");

        coordinator.handle_power_state(RadioState::PoweredOff);
        assert!(!medium.scanning.load());
        assert!(medium.advertised.lock().is_none());

        // Both resume when the radio comes back
        coordinator.handle_power_state(RadioState::PoweredOn);
        assert!(medium.scanning.load());
        assert!(medium.advertised.lock().is_some());
    }

    #[test]
    fn test_advertised_payload_round_trips() {
        let (coordinator, medium) = coordinator();

        coordinator.handle_power_state(RadioState::PoweredOn);
        coordinator
            .start_advertising("user-1".to_string(), Some("session-1".to_string()))
            .expect("advertising starts");

        let bytes = medium.advertised.lock().clone().expect("payload is set");
        let decoded = AdvertisePayload::decode(&bytes).expect("payload decodes");

        assert_eq!(decoded.user_id, "user-1");
        assert_eq!(decoded.session_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn test_unparseable_sightings_are_dropped() {
        let context = CoreContext::default();
        let medium = Arc::new(FakeMedium::default());
        let registry = Arc::new(DiscoveryRegistry::new(&context));
        let coordinator = RadioCoordinator::new(&context, medium, registry.clone());

        coordinator.handle_sighting("device-1", "phone", b"not json", -40, Utc::now());
        assert!(registry.peers().is_empty());

        let payload = AdvertisePayload {
            user_id: "user-1".to_string(),
            session_id: None,
        };

        coordinator.handle_sighting("device-1", "phone", &payload.encode(), -40, Utc::now());

        let peers = registry.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].observed_user_id.as_deref(), Some("user-1"));
    }
}
