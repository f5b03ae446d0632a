use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticket_probe_instruments::timestamp::{payload_ts, payload_ts_option};

/// One timed step of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Position of the step within its run, starting at 1
    pub rank: usize,
    /// The transaction label, for example `LOGIN` or `ADD_COMMENT`
    pub label: String,
    /// Whether the step did what the scenario expected
    pub ok: bool,
    #[serde(with = "payload_ts")]
    pub start_ts: DateTime<Utc>,
    /// Microseconds between `start_ts` and `end_ts`
    pub duration_usecs: i64,
    #[serde(with = "payload_ts")]
    pub end_ts: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
}

/// The `_meta` header of a run document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMeta {
    /// Logical scenario name, such as `single` or `twins`
    pub scenario: String,
    /// Free text identity of the run, also part of the file name
    pub identity: String,
    /// Stable identifier of the host that executed the run
    pub node_indicator: String,
    /// URL of the ticket system instance under test
    pub target: String,
    /// Connection mode, `cloud` or `on-site`
    pub mode: String,
    /// Key of the project the scenario worked in
    pub project: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub db_path: String,
    #[serde(with = "payload_ts")]
    pub start_ts: DateTime<Utc>,
    /// Wall clock duration of the run in seconds
    ///
    /// Zero until the run has been dumped.
    #[serde(default)]
    pub total_secs: f64,
    #[serde(default, with = "payload_ts_option")]
    pub end_ts: Option<DateTime<Utc>>,
    /// Failure flag supplied by the scenario driver
    #[serde(default)]
    pub has_failures_declared: Option<bool>,
    /// Failure flag computed from the events when the run was dumped
    #[serde(default)]
    pub has_failures_detected: Option<bool>,
}

/// The persisted form of a run: metadata plus the ordered event list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunDocument {
    #[serde(rename = "_meta")]
    pub meta: RunMeta,
    pub events: Vec<EventRecord>,
}

impl RunDocument {
    /// Whether any event was recorded as not ok.
    pub fn detect_failures(&self) -> bool {
        self.events.iter().any(|event| !event.ok)
    }
}
