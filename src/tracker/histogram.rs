use crate::report::DurationForNumOfKeepalive;

/// Wall-clock milliseconds partitioned by concurrent keepalive count.
///
/// Index `k` of each series holds the total time during which exactly `k`
/// keepalives were registered (respectively active) since the last reset,
/// except for the open interval since `last_accrual_ms`. The series grow on
/// demand; the concurrent count is bounded by the device's slot budget, so a
/// dense vector stays small.
#[derive(Debug)]
pub(crate) struct DurationHistogram {
    registered_ms: Vec<u64>,
    active_ms: Vec<u64>,
    last_accrual_ms: u64,
}

impl DurationHistogram {
    /// Creates an empty histogram accruing from `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            registered_ms: Vec::new(),
            active_ms: Vec::new(),
            last_accrual_ms: now_ms,
        }
    }

    /// Folds the time elapsed since the previous accrual into the buckets for
    /// the given counts, then moves the watermark to `now_ms`.
    ///
    /// Timestamps are trusted monotonic non-decreasing; an out-of-order
    /// `now_ms` is a caller bug. A zero-length interval still extends the
    /// series so the indexed buckets exist.
    pub fn accrue(&mut self, now_ms: u64, num_registered: usize, num_active: usize) {
        let delta_ms = now_ms - self.last_accrual_ms;
        ensure_bucket(&mut self.registered_ms, num_registered);
        ensure_bucket(&mut self.active_ms, num_active);
        self.registered_ms[num_registered] += delta_ms;
        self.active_ms[num_active] += delta_ms;
        self.last_accrual_ms = now_ms;
    }

    /// Parallel per-count entries, both series padded with zeros to the
    /// longer length.
    pub fn snapshot(&self) -> Vec<DurationForNumOfKeepalive> {
        let len = self.registered_ms.len().max(self.active_ms.len());
        (0..len)
            .map(|k| DurationForNumOfKeepalive {
                num_of_keepalive: k as u32,
                keepalive_registered_durations_msec: bucket(&self.registered_ms, k),
                keepalive_active_durations_msec: bucket(&self.active_ms, k),
            })
            .collect()
    }

    /// Drops all accumulated durations and restarts accrual at `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        self.registered_ms.clear();
        self.active_ms.clear();
        self.last_accrual_ms = now_ms;
    }
}

fn ensure_bucket(series: &mut Vec<u64>, index: usize) {
    if series.len() <= index {
        series.resize(index + 1, 0);
    }
}

fn bucket(series: &[u64], index: usize) -> u64 {
    series.get(index).copied().unwrap_or(0)
}
