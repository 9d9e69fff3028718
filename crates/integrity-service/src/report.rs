//! Fire-and-report handling for best-effort side effects.
//!
//! Audit writes, detector runs, alert writes and flag recomputation
//! never fail the operation they observe. Their errors land here:
//! storage failures are logged at `warn`, anything else (a bug, a
//! corrupt row) at `error`, and a per-kind counter is bumped.

use std::sync::atomic::{AtomicU64, Ordering};

use integrity_core::error::{IntegrityError, IntegrityResult};
use tracing::{error, warn};

/// Which best-effort side effect failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    AuditWrite,
    Detector,
    AlertWrite,
    FlagUpdate,
}

impl SideEffect {
    fn as_str(self) -> &'static str {
        match self {
            SideEffect::AuditWrite => "audit_write",
            SideEffect::Detector => "detector",
            SideEffect::AlertWrite => "alert_write",
            SideEffect::FlagUpdate => "flag_update",
        }
    }
}

/// Failure counters shared by every service writing side effects.
#[derive(Debug, Default)]
pub struct InstrumentationStats {
    audit_write_failures: AtomicU64,
    detector_failures: AtomicU64,
    alert_write_failures: AtomicU64,
    flag_update_failures: AtomicU64,
}

/// Point-in-time copy of [`InstrumentationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub audit_write_failures: u64,
    pub detector_failures: u64,
    pub alert_write_failures: u64,
    pub flag_update_failures: u64,
}

impl InstrumentationStats {
    fn counter(&self, effect: SideEffect) -> &AtomicU64 {
        match effect {
            SideEffect::AuditWrite => &self.audit_write_failures,
            SideEffect::Detector => &self.detector_failures,
            SideEffect::AlertWrite => &self.alert_write_failures,
            SideEffect::FlagUpdate => &self.flag_update_failures,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            audit_write_failures: self.audit_write_failures.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            alert_write_failures: self.alert_write_failures.load(Ordering::Relaxed),
            flag_update_failures: self.flag_update_failures.load(Ordering::Relaxed),
        }
    }

    /// Log and count a failed side effect.
    pub fn report(&self, effect: SideEffect, err: &IntegrityError) {
        self.counter(effect).fetch_add(1, Ordering::Relaxed);
        if err.is_transient() {
            warn!(side_effect = effect.as_str(), error = %err, "best-effort write failed");
        } else {
            error!(
                side_effect = effect.as_str(),
                error = %err,
                "best-effort write failed with a non-transient error"
            );
        }
    }

    /// Swallow the error of a best-effort result after reporting it.
    pub fn fire<T>(&self, effect: SideEffect, result: IntegrityResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(effect, &err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_counted_per_kind() {
        let stats = InstrumentationStats::default();
        let failed: IntegrityResult<()> = Err(IntegrityError::Database("down".into()));
        assert_eq!(stats.fire(SideEffect::AuditWrite, failed), None);
        assert_eq!(stats.fire(SideEffect::Detector, Ok(7)), Some(7));
        stats.report(
            SideEffect::Detector,
            &IntegrityError::Internal("corrupt row".into()),
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.audit_write_failures, 1);
        assert_eq!(snapshot.detector_failures, 1);
        assert_eq!(snapshot.alert_write_failures, 0);
    }
}
