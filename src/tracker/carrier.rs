use std::collections::HashMap;

use crate::caps::NetworkCapabilities;
use crate::report::KeepaliveLifetimeForCarrier;

/// Aggregation key for keepalive lifetimes: one row per distinct carrier,
/// transport set and configured interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CarrierKey {
    pub carrier_id: i32,
    pub transports: u32,
    pub interval_ms: u32,
}

impl CarrierKey {
    /// Snapshots the aggregation key from the capabilities supplied at
    /// keepalive start. The key never changes for the life of a registration.
    pub fn from_capabilities(caps: &NetworkCapabilities, interval_seconds: u32) -> Self {
        Self {
            carrier_id: caps.carrier_id(),
            transports: caps.transport_bitmask(),
            interval_ms: interval_seconds * 1000,
        }
    }
}

/// Accumulated lifetime for one carrier key.
#[derive(Debug, Clone, Copy, Default)]
struct LifetimeTotals {
    registered_ms: u64,
    active_ms: u64,
}

/// Per-carrier keepalive lifetime accumulation.
///
/// Rows are created lazily on first contribution and only removed by reset.
/// Keepalives sharing a key add into the same row across their individual
/// lifespans.
#[derive(Debug, Default)]
pub(crate) struct CarrierLifetimeTable {
    rows: HashMap<CarrierKey, LifetimeTotals>,
}

impl CarrierLifetimeTable {
    /// Adds registered-lifetime milliseconds to the row for `key`, creating
    /// it if absent. A zero delta still creates the row.
    pub fn add_registered(&mut self, key: CarrierKey, delta_ms: u64) {
        self.rows.entry(key).or_default().registered_ms += delta_ms;
    }

    /// Adds active-lifetime milliseconds to the row for `key`, creating it if
    /// absent.
    pub fn add_active(&mut self, key: CarrierKey, delta_ms: u64) {
        self.rows.entry(key).or_default().active_ms += delta_ms;
    }

    /// Produces the full list of rows, in arbitrary order.
    pub fn snapshot(&self) -> Vec<KeepaliveLifetimeForCarrier> {
        self.rows
            .iter()
            .map(|(key, totals)| KeepaliveLifetimeForCarrier {
                carrier_id: key.carrier_id,
                transport_types: key.transports,
                intervals_msec: key.interval_ms,
                lifetime_msec: totals.registered_ms,
                active_lifetime_msec: totals.active_ms,
            })
            .collect()
    }

    /// Clears all rows.
    pub fn reset(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{Transport, UNKNOWN_CARRIER_ID};

    fn cellular_key() -> CarrierKey {
        CarrierKey::from_capabilities(
            &NetworkCapabilities::new().with_transport(Transport::Cellular),
            10,
        )
    }

    #[test]
    fn test_key_snapshot_from_capabilities() {
        let key = cellular_key();
        assert_eq!(key.carrier_id, UNKNOWN_CARRIER_ID);
        assert_eq!(key.transports, 1 << Transport::Cellular as u32);
        assert_eq!(key.interval_ms, 10_000);
    }

    #[test]
    fn test_add_creates_row_on_miss() {
        let mut table = CarrierLifetimeTable::default();
        table.add_registered(cellular_key(), 0);

        let rows = table.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lifetime_msec, 0);
        assert_eq!(rows[0].active_lifetime_msec, 0);
    }

    #[test]
    fn test_additive_across_contributions() {
        let mut table = CarrierLifetimeTable::default();
        table.add_registered(cellular_key(), 1843);
        table.add_active(cellular_key(), 1157);
        table.add_registered(cellular_key(), 2157);
        table.add_active(cellular_key(), 1157);

        let rows = table.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lifetime_msec, 4000);
        assert_eq!(rows[0].active_lifetime_msec, 2314);
    }

    #[test]
    fn test_distinct_keys_keep_distinct_rows() {
        let mut table = CarrierLifetimeTable::default();
        let other = CarrierKey {
            interval_ms: 20_000,
            ..cellular_key()
        };
        table.add_registered(cellular_key(), 100);
        table.add_registered(other, 200);

        let rows = table.snapshot();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_reset_clears_rows() {
        let mut table = CarrierLifetimeTable::default();
        table.add_registered(cellular_key(), 100);
        table.reset();
        assert!(table.snapshot().is_empty());
    }
}
