//! Station registry.
//!
//! The registry maps station names to live [`Station`]s. Stations are stored
//! behind `Arc`, so a lookup hands out a stable reference and releases the map
//! guard before any per-station lock is taken.

use crate::clock::{Clock, SystemClock};
use crate::metric::DEFAULT_MAX_POINTS;
use crate::peer::PeerHandle;
use crate::station::Station;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use drops_protocol::StationEntry;
use drops_transport::ConnectionId;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A live station already uses this name.
    #[error("Station already registered: {0}")]
    AlreadyRegistered(String),

    /// No live station has this name.
    #[error("Unknown station: {0}")]
    UnknownStation(String),
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Points retained per metric per station.
    pub max_metric_points: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_metric_points: DEFAULT_MAX_POINTS,
        }
    }
}

/// Process-wide map of registered stations.
#[derive(Debug)]
pub struct Registry {
    /// Stations indexed by name.
    stations: DashMap<String, Arc<Station>>,
    /// Source of metric timestamps.
    clock: Arc<dyn Clock>,
    /// Configuration.
    config: RegistryConfig,
}

impl Registry {
    /// Create an empty registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default(), Arc::new(SystemClock))
    }

    /// Create an empty registry.
    #[must_use]
    pub fn with_config(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            stations: DashMap::new(),
            clock,
            config,
        }
    }

    /// Register a station owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if the name is taken; the
    /// existing station is left untouched.
    pub fn register(
        &self,
        name: &str,
        kind: &str,
        owner: PeerHandle,
    ) -> Result<Arc<Station>, RegistryError> {
        match self.stations.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(name.to_string())),
            Entry::Vacant(slot) => {
                let owner_id = owner.id().clone();
                let station = Arc::new(Station::new(
                    name,
                    kind,
                    owner,
                    self.config.max_metric_points,
                ));
                slot.insert(Arc::clone(&station));
                info!(station = %name, kind = %kind, connection = %owner_id, "Station registered");
                Ok(station)
            }
        }
    }

    /// Every registered station, in map iteration order.
    #[must_use]
    pub fn list(&self) -> Vec<StationEntry> {
        self.stations
            .iter()
            .map(|entry| StationEntry::new(entry.key().clone(), entry.value().kind()))
            .collect()
    }

    /// Look up a station by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownStation`] if no such station exists.
    pub fn lookup(&self, name: &str) -> Result<Arc<Station>, RegistryError> {
        self.stations
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::UnknownStation(name.to_string()))
    }

    /// Remove a station if it is still owned by `owner`.
    ///
    /// A no-op if the name is absent or was claimed by another connection.
    pub fn unregister(&self, name: &str, owner: &ConnectionId) -> Option<Arc<Station>> {
        let removed = self
            .stations
            .remove_if(name, |_, station| station.owner().id() == owner)
            .map(|(_, station)| station);

        if removed.is_some() {
            info!(station = %name, connection = %owner, "Station unregistered");
        } else {
            debug!(station = %name, connection = %owner, "Unregister skipped, not owner or absent");
        }

        removed
    }

    /// Record a telemetry point for `station` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownStation`] if the station is gone.
    pub fn record_metric(&self, station: &str, metric: &str, value: f64) -> Result<(), RegistryError> {
        let station = self.lookup(station)?;
        station.record_metric(metric, value, self.clock.now_unix());
        Ok(())
    }

    /// Check if a station is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stations.contains_key(name)
    }

    /// Number of registered stations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Returns `true` if no station is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        // Collect first so no map guard is held while station locks are taken.
        let stations: Vec<Arc<Station>> = self
            .stations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        RegistryStats {
            station_count: stations.len(),
            pending_runs: stations.iter().map(|s| s.pending_count()).sum(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered stations.
    pub station_count: usize,
    /// Runs forwarded but not yet completed, across all stations.
    pub pending_runs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::peer::DEFAULT_WRITE_TIMEOUT;
    use crate::station::PendingRun;

    fn make_peer(id: &str) -> PeerHandle {
        PeerHandle::channel(id.into(), 8, DEFAULT_WRITE_TIMEOUT).0
    }

    #[test]
    fn test_register_then_list() {
        let registry = Registry::new();
        registry.register("water", "source", make_peer("conn-1")).unwrap();
        registry.register("porch", "light", make_peer("conn-2")).unwrap();

        let mut listed = registry.list();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            listed,
            vec![
                StationEntry::new("porch", "light"),
                StationEntry::new("water", "source")
            ]
        );
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let registry = Registry::new();
        registry.register("water", "source", make_peer("conn-1")).unwrap();

        assert!(matches!(
            registry.register("water", "barrel", make_peer("conn-2")),
            Err(RegistryError::AlreadyRegistered(_))
        ));

        let station = registry.lookup("water").unwrap();
        assert_eq!(station.kind(), "source");
        assert_eq!(station.owner().id().as_str(), "conn-1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = Registry::new();
        assert!(matches!(
            registry.lookup("water"),
            Err(RegistryError::UnknownStation(_))
        ));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = Registry::new();
        registry.register("water", "source", make_peer("conn-1")).unwrap();

        let owner: ConnectionId = "conn-1".into();
        assert!(registry.unregister("water", &owner).is_some());
        assert!(registry.unregister("water", &owner).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_requires_owner() {
        let registry = Registry::new();
        registry.register("water", "source", make_peer("conn-1")).unwrap();

        assert!(registry.unregister("water", &"conn-2".into()).is_none());
        assert!(registry.contains("water"));
    }

    #[test]
    fn test_name_reusable_after_unregister() {
        let registry = Registry::new();
        registry.register("water", "source", make_peer("conn-1")).unwrap();
        registry.unregister("water", &"conn-1".into());

        registry.register("water", "barrel", make_peer("conn-2")).unwrap();
        assert_eq!(registry.lookup("water").unwrap().kind(), "barrel");
    }

    #[test]
    fn test_record_metric_uses_clock() {
        let clock = Arc::new(ManualClock::new(42));
        let registry = Registry::with_config(
            RegistryConfig {
                max_metric_points: 4,
            },
            clock.clone(),
        );
        registry.register("water", "source", make_peer("conn-1")).unwrap();

        registry.record_metric("water", "level", 1.5).unwrap();
        clock.advance(3);
        registry.record_metric("water", "level", 2.5).unwrap();

        let series = registry.lookup("water").unwrap().metric_series("level").unwrap();
        assert_eq!(series[0].timestamp, 42);
        assert_eq!(series[1].timestamp, 45);

        assert!(registry.record_metric("porch", "level", 1.0).is_err());
    }

    #[test]
    fn test_registry_stats() {
        let registry = Registry::new();
        let water = registry.register("water", "source", make_peer("conn-1")).unwrap();
        registry.register("porch", "light", make_peer("conn-2")).unwrap();

        water.reserve_run(PendingRun {
            nonce: "n1".to_string(),
            function: "test".to_string(),
            station: "water".to_string(),
            requester: make_peer("client"),
        })
        .unwrap();

        let stats = registry.stats();
        assert_eq!(stats.station_count, 2);
        assert_eq!(stats.pending_runs, 1);
    }
}
