use serde::Serialize;

/// Time spent at one concurrent keepalive count.
///
/// `num_of_keepalive` is the count `k`; the two durations are the total
/// milliseconds since the last reset during which exactly `k` keepalives were
/// registered, respectively active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationForNumOfKeepalive {
    pub num_of_keepalive: u32,
    pub keepalive_registered_durations_msec: u64,
    pub keepalive_active_durations_msec: u64,
}

/// Aggregated keepalive lifetime for one carrier row.
///
/// Rows are keyed by `(carrier_id, transport_types, intervals_msec)`;
/// keepalives sharing a key accumulate into the same row across their
/// individual lifespans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeepaliveLifetimeForCarrier {
    pub carrier_id: i32,
    pub transport_types: u32,
    pub intervals_msec: u32,
    pub lifetime_msec: u64,
    pub active_lifetime_msec: u64,
}

/// Daily keepalive metrics snapshot, shaped for telemetry upload.
///
/// The request-count and uid fields are reserved in the upload schema but not
/// observed by the tracker; they are emitted absent/empty, never synthesized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyKeepaliveReport {
    /// One entry per concurrent-count index from 0, all indices present.
    pub duration_per_num_of_keepalive: Vec<DurationForNumOfKeepalive>,
    /// One row per distinct carrier key that contributed since the last reset
    /// or is currently live. Unordered; consumers key on the tuple.
    pub keepalive_lifetime_per_carrier: Vec<KeepaliveLifetimeForCarrier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_requests: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automatic_keepalive_requests: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_user_count: Option<u32>,
    pub uid_list: Vec<u32>,
}

impl DailyKeepaliveReport {
    /// Finds the lifetime row for a carrier key tuple.
    pub fn carrier_row(
        &self,
        carrier_id: i32,
        transport_types: u32,
        intervals_msec: u32,
    ) -> Option<&KeepaliveLifetimeForCarrier> {
        self.keepalive_lifetime_per_carrier.iter().find(|row| {
            row.carrier_id == carrier_id
                && row.transport_types == transport_types
                && row.intervals_msec == intervals_msec
        })
    }
}
