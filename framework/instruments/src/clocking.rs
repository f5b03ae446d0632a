use crate::timestamp::{microseconds_between, now_utc};
use chrono::{DateTime, SubsecRound, Utc};

/// Timing of one action against the ticket system.
///
/// The `duration_usecs` value is whatever the producer of the clocking reported. Consumers that
/// persist a clocking derive the duration from the two timestamps instead, see
/// [Clocking::measured_usecs].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clocking {
    pub start_ts: DateTime<Utc>,
    pub duration_usecs: i64,
    pub end_ts: DateTime<Utc>,
}

impl Clocking {
    /// Create a clocking from a start and an end, deriving the duration.
    pub fn new(start_ts: DateTime<Utc>, end_ts: DateTime<Utc>) -> Self {
        let start_ts = start_ts.trunc_subsecs(6);
        let end_ts = end_ts.trunc_subsecs(6);
        Self {
            start_ts,
            duration_usecs: microseconds_between(&start_ts, &end_ts),
            end_ts,
        }
    }

    /// Create a clocking from an externally supplied triple, keeping the duration hint as given.
    pub fn from_triple(start_ts: DateTime<Utc>, duration_usecs_hint: i64, end_ts: DateTime<Utc>) -> Self {
        Self {
            start_ts: start_ts.trunc_subsecs(6),
            duration_usecs: duration_usecs_hint,
            end_ts: end_ts.trunc_subsecs(6),
        }
    }

    /// Microseconds between the two timestamps, ignoring the duration hint.
    pub fn measured_usecs(&self) -> i64 {
        microseconds_between(&self.start_ts, &self.end_ts)
    }
}

/// Run an action and clock it.
pub fn timed<T, F>(action: F) -> (Clocking, T)
where
    F: FnOnce() -> T,
{
    let start_ts = now_utc();
    let outcome = action();
    let end_ts = now_utc();

    (Clocking::new(start_ts, end_ts), outcome)
}
