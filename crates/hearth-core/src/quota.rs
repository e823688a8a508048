//! Quota gate: daily read/write operation budget.
//!
//! Tracks operation counts against platform-imposed daily ceilings and
//! admits or rejects each prospective operation. Purely local arithmetic
//! over persisted counters; no network access. The gate never errors --
//! admission checks return booleans and persistence failures are logged
//! and absorbed.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::QuotaLimits;
use crate::store::KvStore;

const COUNTERS_KEY: &str = "quota/counters";

/// Which daily counter an operation draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Reads,
    Writes,
}

impl QuotaKind {
    /// Stable name used in errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reads => "reads",
            Self::Writes => "writes",
        }
    }
}

/// Persisted daily counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct QuotaCounters {
    reads: u64,
    writes: u64,
    last_reset: NaiveDate,
}

impl QuotaCounters {
    fn fresh(today: NaiveDate) -> Self {
        Self {
            reads: 0,
            writes: 0,
            last_reset: today,
        }
    }
}

/// Read-only usage snapshot for one counter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindUsage {
    /// Units consumed today
    pub used: u64,
    /// Daily ceiling
    pub limit: u64,
    /// Consumed fraction of the ceiling, 0.0..=1.0
    pub percent: f64,
    /// Units still available today
    pub remaining: u64,
    /// Whether consumption has crossed the 80% warning threshold
    pub near_limit: bool,
}

/// Read-only usage snapshot across both counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub reads: KindUsage,
    pub writes: KindUsage,
}

/// Gate admitting operations against the daily read/write budget.
pub struct QuotaGate {
    store: Arc<KvStore>,
    limits: QuotaLimits,
    state: Mutex<QuotaCounters>,
}

impl QuotaGate {
    /// Build a gate, restoring persisted counters from the store.
    ///
    /// Counters persisted on a previous calendar day are reset on first use.
    pub fn new(store: Arc<KvStore>, limits: QuotaLimits) -> Self {
        let today = Self::today();
        let counters = match store.get_json::<QuotaCounters>(COUNTERS_KEY) {
            Ok(Some(counters)) => counters,
            Ok(None) => QuotaCounters::fresh(today),
            Err(error) => {
                tracing::warn!("Failed to restore quota counters, starting fresh: {error}");
                QuotaCounters::fresh(today)
            }
        };

        Self {
            store,
            limits,
            state: Mutex::new(counters),
        }
    }

    /// Whether admitting `count` operations of `kind` stays within the
    /// daily ceiling. Does not consume quota.
    pub fn can_perform(&self, kind: QuotaKind, count: u64) -> bool {
        let mut state = self.lock_state();
        self.roll_day_if_needed(&mut state);

        let (used, limit) = self.used_and_limit(&state, kind);
        used.saturating_add(count) <= limit
    }

    /// Consume `count` units of `kind`. Called only after the gated
    /// operation was actually attempted; never implicit in `can_perform`.
    pub fn record(&self, kind: QuotaKind, count: u64) {
        let mut state = self.lock_state();
        self.roll_day_if_needed(&mut state);

        match kind {
            QuotaKind::Reads => state.reads = state.reads.saturating_add(count),
            QuotaKind::Writes => state.writes = state.writes.saturating_add(count),
        }
        self.persist(&state);
    }

    /// Current usage snapshot for both counters. Observability only.
    pub fn usage(&self) -> QuotaUsage {
        let mut state = self.lock_state();
        self.roll_day_if_needed(&mut state);

        QuotaUsage {
            reads: self.kind_usage(&state, QuotaKind::Reads),
            writes: self.kind_usage(&state, QuotaKind::Writes),
        }
    }

    /// Units consumed today for `kind`. Used to build quota errors.
    pub fn used(&self, kind: QuotaKind) -> u64 {
        let mut state = self.lock_state();
        self.roll_day_if_needed(&mut state);
        self.used_and_limit(&state, kind).0
    }

    /// Configured ceiling for `kind`.
    #[must_use]
    pub const fn limit(&self, kind: QuotaKind) -> u64 {
        match kind {
            QuotaKind::Reads => self.limits.daily_reads,
            QuotaKind::Writes => self.limits.daily_writes,
        }
    }

    fn kind_usage(&self, state: &QuotaCounters, kind: QuotaKind) -> KindUsage {
        let (used, limit) = self.used_and_limit(state, kind);
        #[allow(clippy::cast_precision_loss)]
        let percent = if limit == 0 {
            1.0
        } else {
            (used as f64 / limit as f64).min(1.0)
        };
        KindUsage {
            used,
            limit,
            percent,
            remaining: limit.saturating_sub(used),
            near_limit: percent >= 0.8,
        }
    }

    const fn used_and_limit(&self, state: &QuotaCounters, kind: QuotaKind) -> (u64, u64) {
        match kind {
            QuotaKind::Reads => (state.reads, self.limits.daily_reads),
            QuotaKind::Writes => (state.writes, self.limits.daily_writes),
        }
    }

    fn roll_day_if_needed(&self, state: &mut QuotaCounters) {
        let today = Self::today();
        if state.last_reset != today {
            tracing::debug!(
                "Quota day rollover: {} -> {today}, resetting counters",
                state.last_reset
            );
            *state = QuotaCounters::fresh(today);
            self.persist(state);
        }
    }

    fn persist(&self, state: &QuotaCounters) {
        if let Err(error) = self.store.put_json(COUNTERS_KEY, state) {
            tracing::warn!("Failed to persist quota counters: {error}");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QuotaCounters> {
        // Counter updates cannot panic, so the mutex cannot be poisoned in
        // practice; recover the guard rather than propagating.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn gate_with_limits(reads: u64, writes: u64) -> QuotaGate {
        let store = Arc::new(KvStore::open_in_memory().unwrap());
        QuotaGate::new(
            store,
            QuotaLimits {
                daily_reads: reads,
                daily_writes: writes,
            },
        )
    }

    #[test]
    fn admits_up_to_the_ceiling_and_rejects_beyond() {
        let gate = gate_with_limits(10, 2);

        assert!(gate.can_perform(QuotaKind::Writes, 2));
        gate.record(QuotaKind::Writes, 2);
        assert!(!gate.can_perform(QuotaKind::Writes, 1));
        assert!(gate.can_perform(QuotaKind::Reads, 10));
    }

    #[test]
    fn can_perform_does_not_consume_quota() {
        let gate = gate_with_limits(5, 5);

        for _ in 0..20 {
            assert!(gate.can_perform(QuotaKind::Reads, 5));
        }
        assert_eq!(gate.usage().reads.used, 0);
    }

    #[test]
    fn counters_never_exceed_ceiling_under_gated_use() {
        let gate = gate_with_limits(100, 3);

        let mut attempted = 0;
        for _ in 0..10 {
            if gate.can_perform(QuotaKind::Writes, 1) {
                gate.record(QuotaKind::Writes, 1);
                attempted += 1;
            }
        }

        assert_eq!(attempted, 3);
        let usage = gate.usage();
        assert_eq!(usage.writes.used, 3);
        assert_eq!(usage.writes.remaining, 0);
    }

    #[test]
    fn usage_reports_percentage_and_warning_threshold() {
        let gate = gate_with_limits(100, 10);
        gate.record(QuotaKind::Writes, 8);

        let usage = gate.usage();
        assert!((usage.writes.percent - 0.8).abs() < f64::EPSILON);
        assert!(usage.writes.near_limit);
        assert!(!usage.reads.near_limit);
    }

    #[test]
    fn counters_survive_restart_within_the_same_day() {
        let store = Arc::new(KvStore::open_in_memory().unwrap());
        let limits = QuotaLimits {
            daily_reads: 10,
            daily_writes: 10,
        };

        let gate = QuotaGate::new(Arc::clone(&store), limits);
        gate.record(QuotaKind::Reads, 4);
        drop(gate);

        let gate = QuotaGate::new(store, limits);
        assert_eq!(gate.usage().reads.used, 4);
    }

    #[test]
    fn stale_counters_reset_on_new_day() {
        let store = Arc::new(KvStore::open_in_memory().unwrap());
        let yesterday = QuotaCounters {
            reads: 40,
            writes: 15,
            last_reset: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        };
        store.put_json(COUNTERS_KEY, &yesterday).unwrap();

        let gate = QuotaGate::new(
            store,
            QuotaLimits {
                daily_reads: 50,
                daily_writes: 20,
            },
        );

        // First check of the new day resets both counters before evaluating.
        assert!(gate.can_perform(QuotaKind::Reads, 50));
        let usage = gate.usage();
        assert_eq!(usage.reads.used, 0);
        assert_eq!(usage.writes.used, 0);
    }
}
