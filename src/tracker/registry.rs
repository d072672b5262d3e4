use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::caps::Network;

use super::carrier::CarrierKey;
use super::StatsError;

/// Identity of one keepalive: the offload slot within a network's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RegistrationKey {
    pub network: Network,
    pub slot: u32,
}

/// Live bookkeeping for one registered keepalive.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    /// Carrier aggregation key snapshotted at start.
    pub carrier_key: CarrierKey,
    /// Uptime when the keepalive was started.
    pub started_at_ms: u64,
    /// Uptime of the most recent state change affecting this keepalive.
    pub last_transition_ms: u64,
    pub paused: bool,
}

impl Registration {
    /// Creates a fresh, unpaused registration starting at `now_ms`.
    pub fn new(carrier_key: CarrierKey, now_ms: u64) -> Self {
        Self {
            carrier_key,
            started_at_ms: now_ms,
            last_transition_ms: now_ms,
            paused: false,
        }
    }
}

/// Table of live keepalive registrations keyed by (network, slot).
///
/// A key stays occupied until its keepalive stops; starting again on the same
/// key afterwards creates an independent registration.
#[derive(Debug, Default)]
pub(crate) struct RegistrationTable {
    entries: HashMap<RegistrationKey, Registration>,
}

impl RegistrationTable {
    /// Whether a live registration occupies `key`.
    pub fn contains(&self, key: &RegistrationKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a registration, failing if the key is still occupied.
    pub fn insert(
        &mut self,
        key: RegistrationKey,
        registration: Registration,
    ) -> Result<(), StatsError> {
        match self.entries.entry(key) {
            Entry::Occupied(_) => Err(StatsError::SlotInUse {
                network: key.network,
                slot: key.slot,
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(registration);
                Ok(())
            }
        }
    }

    /// Mutable access to the registration at `key`.
    pub fn get_mut(&mut self, key: &RegistrationKey) -> Result<&mut Registration, StatsError> {
        self.entries
            .get_mut(key)
            .ok_or(StatsError::UnknownRegistration {
                network: key.network,
                slot: key.slot,
            })
    }

    /// Removes and returns the registration at `key`.
    pub fn remove(&mut self, key: &RegistrationKey) -> Result<Registration, StatsError> {
        self.entries
            .remove(key)
            .ok_or(StatsError::UnknownRegistration {
                network: key.network,
                slot: key.slot,
            })
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over all live registrations, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Registration> {
        self.entries.values_mut()
    }
}
