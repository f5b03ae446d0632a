mod clocking;
pub mod timestamp;

pub use clocking::{timed, Clocking};

use chrono::{DateTime, Utc};

/// An operation against the ticket system that is in flight.
///
/// Start one right before calling the ticket system client and finish it with the response to
/// get a [StepOutcome] that can be recorded.
pub struct OperationRecord {
    label: String,
    started: DateTime<Utc>,
}

impl OperationRecord {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: timestamp::now_utc(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Finish the operation, treating an `Err` response as a failed step.
    pub fn finish<T, E>(self, response: &Result<T, E>) -> StepOutcome {
        self.finish_with(response.is_ok())
    }

    /// Finish the operation with an outcome decided by the caller.
    ///
    /// Use this when the call succeeded but returned something unexpected, such as an issue in
    /// the wrong state.
    pub fn finish_with(self, ok: bool) -> StepOutcome {
        let clocking = Clocking::new(self.started, timestamp::now_utc());
        log::debug!(
            "Operation {} took {}us, and failed? {}",
            self.label,
            clocking.duration_usecs,
            !ok,
        );

        StepOutcome {
            label: self.label,
            ok,
            clocking,
        }
    }
}

/// The result of one timed step, ready to be added to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub label: String,
    pub ok: bool,
    pub clocking: Clocking,
}
