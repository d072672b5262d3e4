//! Keepalive lifecycle accounting.
//!
//! [`KeepaliveStatsTracker`] consumes the keepalive controller's start,
//! pause, resume and stop hooks and maintains three tables: the live
//! registration table, the duration-per-concurrent-count histogram, and the
//! per-carrier lifetime table. Every hook folds the elapsed time since the
//! previous accrual into the histogram at the pre-event counts before moving
//! any cursor, so each histogram bucket reflects exactly the window during
//! which the count held. Per-keepalive lifetime lands in the carrier table on
//! transitions only; report building folds the open tails on demand.

mod carrier;
mod histogram;
mod registry;

use std::thread::{self, ThreadId};

use thiserror::Error;
use tracing::debug;

use crate::caps::{Network, NetworkCapabilities};
use crate::clock::UptimeClock;
use crate::report::DailyKeepaliveReport;

use self::carrier::{CarrierKey, CarrierLifetimeTable};
use self::histogram::DurationHistogram;
use self::registry::{Registration, RegistrationKey, RegistrationTable};

/// Errors raised by the tracker.
///
/// All variants are caller bugs, not recoverable conditions; a failed call
/// leaves the tracker's tables untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    /// Operation invoked off the dispatcher thread the tracker is bound to.
    #[error("not running on the tracker's dispatcher thread")]
    WrongContext,

    /// Start for a (network, slot) whose prior keepalive is still registered.
    #[error("keepalive slot {slot} on network {network} is still registered")]
    SlotInUse { network: Network, slot: u32 },

    /// Pause, resume or stop for a (network, slot) with no live registration.
    #[error("no registered keepalive for slot {slot} on network {network}")]
    UnknownRegistration { network: Network, slot: u32 },

    /// Pause of an already-paused keepalive, or resume of a running one.
    #[error("invalid pause/resume transition for keepalive slot {slot} on network {network}")]
    IllegalTransition {
        network: Network,
        slot: u32,
        /// Pause state the keepalive was already in.
        paused: bool,
    },
}

/// Binds the tracker to the thread that constructed it.
///
/// The dispatcher is externally managed; the tracker only asserts that every
/// call arrives on it, before any state is read or written.
#[derive(Debug)]
struct DispatcherGuard {
    owner: ThreadId,
}

impl DispatcherGuard {
    fn for_current_thread() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    fn ensure(&self) -> Result<(), StatsError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(StatsError::WrongContext)
        }
    }
}

/// Tracks keepalive lifecycle events and aggregates daily metrics.
///
/// The tracker is bound to the thread it is constructed on; every public
/// method fails fast with [`StatsError::WrongContext`] when invoked from any
/// other thread. Within the dispatcher, events are bounded synchronous
/// updates of in-memory tables and never block.
pub struct KeepaliveStatsTracker {
    clock: Box<dyn UptimeClock>,
    guard: DispatcherGuard,
    registrations: RegistrationTable,
    durations: DurationHistogram,
    carriers: CarrierLifetimeTable,
    /// Live keepalives, paused or not. Always equals the registration count.
    num_registered: usize,
    /// Live keepalives that are not paused.
    num_active: usize,
}

impl KeepaliveStatsTracker {
    /// Creates a tracker bound to the current thread, accruing from the
    /// clock's current time.
    pub fn new(clock: Box<dyn UptimeClock>) -> Self {
        let now_ms = clock.now_ms();
        Self {
            clock,
            guard: DispatcherGuard::for_current_thread(),
            registrations: RegistrationTable::default(),
            durations: DurationHistogram::new(now_ms),
            carriers: CarrierLifetimeTable::default(),
            num_registered: 0,
            num_active: 0,
        }
    }

    /// Registers a started keepalive.
    ///
    /// The carrier id, transport bitmask and interval are snapshotted from
    /// `capabilities` now and never re-derived. Fails with
    /// [`StatsError::SlotInUse`] while a prior keepalive on the same
    /// (network, slot) is still registered.
    pub fn on_start_keepalive(
        &mut self,
        network: Network,
        slot: u32,
        capabilities: &NetworkCapabilities,
        interval_seconds: u32,
    ) -> Result<(), StatsError> {
        self.guard.ensure()?;
        let key = RegistrationKey { network, slot };
        // Validate before accrual so a rejected start perturbs nothing.
        if self.registrations.contains(&key) {
            return Err(StatsError::SlotInUse { network, slot });
        }

        let now_ms = self.clock.now_ms();
        self.durations
            .accrue(now_ms, self.num_registered, self.num_active);

        let carrier_key = CarrierKey::from_capabilities(capabilities, interval_seconds);
        self.registrations
            .insert(key, Registration::new(carrier_key, now_ms))?;
        self.num_registered += 1;
        self.num_active += 1;

        debug!(%network, slot, interval_seconds, "keepalive started");
        Ok(())
    }

    /// Marks a registered keepalive paused.
    ///
    /// Folds the keepalive's running interval into both its carrier row
    /// totals. Fails if the keepalive is unknown or already paused.
    pub fn on_pause_keepalive(&mut self, network: Network, slot: u32) -> Result<(), StatsError> {
        self.guard.ensure()?;
        let key = RegistrationKey { network, slot };
        let registration = self.registrations.get_mut(&key)?;
        if registration.paused {
            return Err(StatsError::IllegalTransition {
                network,
                slot,
                paused: true,
            });
        }

        let now_ms = self.clock.now_ms();
        self.durations
            .accrue(now_ms, self.num_registered, self.num_active);

        let delta_ms = now_ms - registration.last_transition_ms;
        self.carriers.add_registered(registration.carrier_key, delta_ms);
        self.carriers.add_active(registration.carrier_key, delta_ms);
        registration.paused = true;
        registration.last_transition_ms = now_ms;
        self.num_active -= 1;

        debug!(%network, slot, "keepalive paused");
        Ok(())
    }

    /// Marks a paused keepalive running again.
    ///
    /// Folds the paused interval into the carrier row's registered total
    /// only. Fails if the keepalive is unknown or not paused.
    pub fn on_resume_keepalive(&mut self, network: Network, slot: u32) -> Result<(), StatsError> {
        self.guard.ensure()?;
        let key = RegistrationKey { network, slot };
        let registration = self.registrations.get_mut(&key)?;
        if !registration.paused {
            return Err(StatsError::IllegalTransition {
                network,
                slot,
                paused: false,
            });
        }

        let now_ms = self.clock.now_ms();
        self.durations
            .accrue(now_ms, self.num_registered, self.num_active);

        let delta_ms = now_ms - registration.last_transition_ms;
        self.carriers.add_registered(registration.carrier_key, delta_ms);
        registration.paused = false;
        registration.last_transition_ms = now_ms;
        self.num_active += 1;

        debug!(%network, slot, "keepalive resumed");
        Ok(())
    }

    /// Unregisters a keepalive, folding its trailing interval into its
    /// carrier row. The (network, slot) key becomes reusable; a later start
    /// on it aggregates as an independent lifespan.
    pub fn on_stop_keepalive(&mut self, network: Network, slot: u32) -> Result<(), StatsError> {
        self.guard.ensure()?;
        let key = RegistrationKey { network, slot };
        if !self.registrations.contains(&key) {
            return Err(StatsError::UnknownRegistration { network, slot });
        }

        let now_ms = self.clock.now_ms();
        self.durations
            .accrue(now_ms, self.num_registered, self.num_active);

        let registration = self.registrations.remove(&key)?;
        let tail_ms = now_ms - registration.last_transition_ms;
        self.carriers.add_registered(registration.carrier_key, tail_ms);
        if !registration.paused {
            self.carriers.add_active(registration.carrier_key, tail_ms);
            self.num_active -= 1;
        }
        self.num_registered -= 1;

        debug!(
            %network,
            slot,
            lifetime_ms = now_ms - registration.started_at_ms,
            "keepalive stopped",
        );
        Ok(())
    }

    /// Builds the daily report without clearing accumulated state.
    ///
    /// Two builds at the same instant produce identical reports.
    pub fn build_keepalive_metrics(&mut self) -> Result<DailyKeepaliveReport, StatsError> {
        self.guard.ensure()?;
        let now_ms = self.clock.now_ms();
        Ok(self.build_report(now_ms))
    }

    /// Builds the daily report, then zeroes the duration and lifetime tables.
    ///
    /// Live registrations survive the reset and keep accruing from the reset
    /// instant, so the next report still carries their concurrent count and a
    /// zero-duration row per live carrier key.
    pub fn build_and_reset_metrics(&mut self) -> Result<DailyKeepaliveReport, StatsError> {
        self.guard.ensure()?;
        let now_ms = self.clock.now_ms();
        let report = self.build_report(now_ms);
        self.durations.reset(now_ms);
        self.carriers.reset();

        debug!(live = self.num_registered, "keepalive metrics reset");
        Ok(report)
    }

    fn build_report(&mut self, now_ms: u64) -> DailyKeepaliveReport {
        debug_assert_eq!(self.num_registered, self.registrations.len());
        debug_assert!(self.num_active <= self.num_registered);

        self.durations
            .accrue(now_ms, self.num_registered, self.num_active);

        // Fold every live keepalive's open interval into the lifetime table
        // and move its watermark. A zero tail still creates the carrier row.
        for registration in self.registrations.iter_mut() {
            let tail_ms = now_ms - registration.last_transition_ms;
            self.carriers.add_registered(registration.carrier_key, tail_ms);
            if !registration.paused {
                self.carriers.add_active(registration.carrier_key, tail_ms);
            }
            registration.last_transition_ms = now_ms;
        }

        DailyKeepaliveReport {
            duration_per_num_of_keepalive: self.durations.snapshot(),
            keepalive_lifetime_per_carrier: self.carriers.snapshot(),
            keepalive_requests: None,
            automatic_keepalive_requests: None,
            distinct_user_count: None,
            uid_list: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Transport;
    use crate::clock::ManualClock;

    const NETWORK: Network = Network(123);

    fn cellular_caps() -> NetworkCapabilities {
        NetworkCapabilities::new().with_transport(Transport::Cellular)
    }

    fn tracker_at_zero() -> (ManualClock, KeepaliveStatsTracker) {
        let clock = ManualClock::new(0);
        let tracker = KeepaliveStatsTracker::new(Box::new(clock.clone()));
        (clock, tracker)
    }

    #[test]
    fn test_start_duplicate_slot_rejected() {
        let (clock, mut tracker) = tracker_at_zero();
        clock.set(1000);
        tracker
            .on_start_keepalive(NETWORK, 1, &cellular_caps(), 10)
            .expect("first start should succeed");

        clock.set(2000);
        assert_eq!(
            tracker.on_start_keepalive(NETWORK, 1, &cellular_caps(), 10),
            Err(StatsError::SlotInUse {
                network: NETWORK,
                slot: 1,
            })
        );
    }

    #[test]
    fn test_transitions_on_unknown_slot_rejected() {
        let (clock, mut tracker) = tracker_at_zero();
        clock.set(1000);

        let expected = Err(StatsError::UnknownRegistration {
            network: NETWORK,
            slot: 9,
        });
        assert_eq!(tracker.on_pause_keepalive(NETWORK, 9), expected);
        assert_eq!(tracker.on_resume_keepalive(NETWORK, 9), expected);
        assert_eq!(tracker.on_stop_keepalive(NETWORK, 9), expected);
    }

    #[test]
    fn test_no_op_transitions_rejected() {
        let (clock, mut tracker) = tracker_at_zero();
        clock.set(1000);
        tracker
            .on_start_keepalive(NETWORK, 1, &cellular_caps(), 10)
            .expect("start should succeed");

        // Resume of a running keepalive.
        assert_eq!(
            tracker.on_resume_keepalive(NETWORK, 1),
            Err(StatsError::IllegalTransition {
                network: NETWORK,
                slot: 1,
                paused: false,
            })
        );

        clock.set(2000);
        tracker
            .on_pause_keepalive(NETWORK, 1)
            .expect("pause should succeed");

        // Pause of an already-paused keepalive.
        assert_eq!(
            tracker.on_pause_keepalive(NETWORK, 1),
            Err(StatsError::IllegalTransition {
                network: NETWORK,
                slot: 1,
                paused: true,
            })
        );
    }

    #[test]
    fn test_failed_calls_leave_state_unchanged() {
        let (clock, mut tracker) = tracker_at_zero();
        clock.set(1000);
        tracker
            .on_start_keepalive(NETWORK, 1, &cellular_caps(), 10)
            .expect("start should succeed");

        clock.set(2000);
        let _ = tracker.on_start_keepalive(NETWORK, 1, &cellular_caps(), 10);
        let _ = tracker.on_resume_keepalive(NETWORK, 1);
        let _ = tracker.on_stop_keepalive(NETWORK, 2);

        clock.set(5000);
        let report = tracker
            .build_keepalive_metrics()
            .expect("build should succeed");

        // Identical to a clean start-at-1000, build-at-5000 run.
        let durations = &report.duration_per_num_of_keepalive;
        assert_eq!(durations.len(), 2);
        assert_eq!(durations[0].keepalive_registered_durations_msec, 1000);
        assert_eq!(durations[1].keepalive_registered_durations_msec, 4000);
        assert_eq!(durations[1].keepalive_active_durations_msec, 4000);
    }

    #[test]
    fn test_off_thread_calls_rejected() {
        let (clock, mut tracker) = tracker_at_zero();
        clock.set(1000);
        tracker
            .on_start_keepalive(NETWORK, 1, &cellular_caps(), 10)
            .expect("start on the owning thread should succeed");

        thread::scope(|scope| {
            scope.spawn(|| {
                assert_eq!(
                    tracker.on_start_keepalive(NETWORK, 2, &cellular_caps(), 10),
                    Err(StatsError::WrongContext)
                );
                assert_eq!(
                    tracker.on_pause_keepalive(NETWORK, 1),
                    Err(StatsError::WrongContext)
                );
                assert_eq!(
                    tracker.on_resume_keepalive(NETWORK, 1),
                    Err(StatsError::WrongContext)
                );
                assert_eq!(
                    tracker.on_stop_keepalive(NETWORK, 1),
                    Err(StatsError::WrongContext)
                );
                assert_eq!(
                    tracker.build_keepalive_metrics().unwrap_err(),
                    StatsError::WrongContext
                );
                assert_eq!(
                    tracker.build_and_reset_metrics().unwrap_err(),
                    StatsError::WrongContext
                );
            });
        });
    }

    #[test]
    fn test_error_display_names_the_key() {
        let err = StatsError::SlotInUse {
            network: NETWORK,
            slot: 3,
        };
        assert_eq!(
            err.to_string(),
            "keepalive slot 3 on network 123 is still registered"
        );
    }
}
