use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{signal_level, CoreContext, CoreEvent};

/// One observed radio advertisement, keyed by the radio source that sent it.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub device_id: String,
    pub display_name: String,
    /// The user behind the device, once an advertisement has revealed it.
    pub observed_user_id: Option<String>,
    /// The session the peer is part of, once an advertisement has revealed it.
    pub observed_session_id: Option<String>,
    /// The raw strength reading from the most recent sighting.
    pub signal_raw: i32,
    /// The 1..=5 strength derived from `signal_raw`.
    pub signal_level: u8,
    pub last_seen_at: DateTime<Utc>,
}

/// A single advertisement sighting, as reported by the radio medium.
#[derive(Debug, Clone)]
pub struct Sighting {
    pub device_id: String,
    pub display_name: String,
    pub signal_raw: i32,
    pub observed_user_id: Option<String>,
    pub observed_session_id: Option<String>,
}

/// The registry keeps track of the currently visible peers and forgets the ones
/// that have gone quiet.
///
/// It is the sole owner of [DiscoveredPeer] records. Reads hand out clones,
/// and absence of data is a valid, silent state.
pub struct DiscoveryRegistry {
    context: CoreContext,
    peers: DashMap<String, DiscoveredPeer>,
}

impl DiscoveryRegistry {
    pub fn new(context: &CoreContext) -> Self {
        Self {
            context: context.clone(),
            peers: Default::default(),
        }
    }

    /// Inserts or refreshes the record for a sighting.
    ///
    /// Advertisements may reveal identity fields incrementally over multiple
    /// packets, so newly learned fields are merged into an existing record
    /// and previously learned ones are never discarded.
    pub fn record_sighting(&self, sighting: Sighting, now: DateTime<Utc>) {
        self.peers
            .entry(sighting.device_id.clone())
            .and_modify(|peer| {
                peer.display_name = sighting.display_name.clone();
                peer.signal_raw = sighting.signal_raw;
                peer.signal_level = signal_level(sighting.signal_raw);
                peer.last_seen_at = now;

                if let Some(user_id) = &sighting.observed_user_id {
                    peer.observed_user_id = Some(user_id.clone());
                }

                if let Some(session_id) = &sighting.observed_session_id {
                    peer.observed_session_id = Some(session_id.clone());
                }
            })
            .or_insert_with(|| DiscoveredPeer {
                device_id: sighting.device_id.clone(),
                display_name: sighting.display_name,
                observed_user_id: sighting.observed_user_id,
                observed_session_id: sighting.observed_session_id,
                signal_raw: sighting.signal_raw,
                signal_level: signal_level(sighting.signal_raw),
                last_seen_at: now,
            });

        self.emit_peers();
    }

    /// Removes every record that has not been sighted within the staleness window.
    ///
    /// This runs on a fixed cadence so peers that silently disappear are
    /// forgotten even when no new sightings arrive.
    pub fn evict_stale(&self, now: DateTime<Utc>) {
        let window = self.context.config.peer_staleness();
        let before = self.peers.len();

        self.peers.retain(|_, peer| now - peer.last_seen_at <= window);

        if self.peers.len() != before {
            self.emit_peers();
        }
    }

    /// Returns a snapshot of every currently visible peer.
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.peers.iter().map(|p| p.clone()).collect()
    }

    /// Returns the distinct session ids advertised by visible peers.
    pub fn nearby_session_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .peers
            .iter()
            .filter_map(|p| p.observed_session_id.clone())
            .filter(|id| !id.is_empty())
            .collect();

        ids.sort();
        ids.dedup();
        ids
    }

    fn emit_peers(&self) {
        self.context.emit(CoreEvent::PeersChanged {
            peers: self.peers(),
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn sighting(device_id: &str) -> Sighting {
        Sighting {
            device_id: device_id.to_string(),
            display_name: "Someone's phone".to_string(),
            signal_raw: -48,
            observed_user_id: None,
            observed_session_id: None,
        }
    }

    #[test]
    fn test_sighting_updates_record() {
        let context = CoreContext::default();
        let registry = DiscoveryRegistry::new(&context);
        let now = Utc::now();

        registry.record_sighting(sighting("device-1"), now);
        registry.record_sighting(
            Sighting {
                signal_raw: -70,
                ..sighting("device-1")
            },
            now + Duration::seconds(5),
        );

        let peers = registry.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].signal_raw, -70);
        assert_eq!(peers[0].signal_level, 2);
        assert_eq!(peers[0].last_seen_at, now + Duration::seconds(5));
    }

    #[test]
    fn test_identity_fields_merge() {
        let context = CoreContext::default();
        let registry = DiscoveryRegistry::new(&context);
        let now = Utc::now();

        registry.record_sighting(
            Sighting {
                observed_user_id: Some("user-1".to_string()),
                ..sighting("device-1")
            },
            now,
        );

        registry.record_sighting(
            Sighting {
                observed_session_id: Some("session-1".to_string()),
                ..sighting("device-1")
            },
            now,
        );

        let peer = &registry.peers()[0];
        assert_eq!(peer.observed_user_id.as_deref(), Some("user-1"));
        assert_eq!(peer.observed_session_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn test_eviction_window() {
        let context = CoreContext::default();
        let registry = DiscoveryRegistry::new(&context);
        let now = Utc::now();

        registry.record_sighting(sighting("device-1"), now);

        registry.evict_stale(now);
        assert_eq!(registry.peers().len(), 1);

        registry.evict_stale(now + Duration::seconds(59));
        assert_eq!(registry.peers().len(), 1);

        registry.evict_stale(now + Duration::seconds(61));
        assert!(registry.peers().is_empty());
    }

    #[test]
    fn test_nearby_session_ids_are_distinct() {
        let context = CoreContext::default();
        let registry = DiscoveryRegistry::new(&context);
        let now = Utc::now();

        for device_id in ["device-1", "device-2"] {
            registry.record_sighting(
                Sighting {
                    observed_session_id: Some("session-1".to_string()),
                    ..sighting(device_id)
                },
                now,
            );
        }

        registry.record_sighting(sighting("device-3"), now);

        assert_eq!(registry.nearby_session_ids(), vec!["session-1".to_string()]);
    }
}
