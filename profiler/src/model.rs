use crate::stats::TransactionStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ticket_probe_instruments::timestamp::{payload_ts, payload_ts_list, payload_ts_option};

/// Run and transaction counters, kept for the whole batch and for each target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub sequence_count: usize,
    pub slow_ta_count: usize,
    pub total_ta_count: usize,
    pub sequence_ok_count: usize,
    pub ta_ok_count: usize,
}

/// A transaction that took at least as long as the slowness threshold of its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowTransaction {
    /// Position in the slow list of the target, starting at 1
    pub slot: usize,
    pub ta_secs: f64,
    pub label: String,
    pub step: usize,
    /// `YYYY-MM-DD` of the run start
    pub day_tag: String,
    /// `YYYY-MM` of the run start
    pub month_tag: String,
    pub year: i32,
    #[serde(with = "payload_ts")]
    pub sequence_start_ts: DateTime<Utc>,
    #[serde(with = "payload_ts")]
    pub event_start_ts: DateTime<Utc>,
    pub start_rel: f64,
    pub end_rel: f64,
    pub scenario: String,
    pub flavor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step: usize,
    pub label: String,
    pub duration_usecs: i64,
    pub ok: bool,
    pub start_rel: f64,
    #[serde(with = "payload_ts")]
    pub start_ts: DateTime<Utc>,
    pub end_rel: f64,
}

/// The step by step timing of one run, written next to the benchmark document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub scenario: String,
    pub probe: String,
    pub target: String,
    pub ok: bool,
    #[serde(with = "payload_ts")]
    pub start_ts: DateTime<Utc>,
    #[serde(with = "payload_ts")]
    pub end_ts: DateTime<Utc>,
    pub total_secs: f64,
    pub duty_secs: f64,
    /// Absent for runs without measurable wall clock time
    pub duty_cycle_percent: Option<f64>,
    pub trace: Vec<TraceStep>,
}

/// Everything the benchmark knows about one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub probes: Vec<String>,
    pub scenarios: Vec<String>,
    pub flavors: Vec<String>,
    /// Only labels with at least one sample
    pub transaction_stats: BTreeMap<String, TransactionStats>,
    #[serde(with = "payload_ts")]
    pub first_start_ts: DateTime<Utc>,
    #[serde(with = "payload_ts")]
    pub last_end_ts: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: Counts,
    #[serde(with = "payload_ts_list")]
    pub run_start_ts: Vec<DateTime<Utc>>,
    #[serde(with = "payload_ts_list")]
    pub run_end_ts: Vec<DateTime<Utc>>,
    pub total_secs: Vec<f64>,
    pub duty_secs: Vec<f64>,
    pub duty_cycles_percent: Vec<Option<f64>>,
    pub slow_transactions: Vec<SlowTransaction>,
}

/// Result of profiling a batch of runs, written as `benchmark.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDocument {
    /// Earliest run start, absent for an empty batch
    #[serde(default, with = "payload_ts_option")]
    pub ts_frame_start: Option<DateTime<Utc>>,
    /// Latest run end, absent for an empty batch
    #[serde(default, with = "payload_ts_option")]
    pub ts_frame_end: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counts: Counts,
    pub slow_means_more_than_secs: f64,
    /// Per label thresholds that replace the global one
    #[serde(default)]
    pub slow_secs_by_label: BTreeMap<String, f64>,
    pub step_to_ta: BTreeMap<usize, String>,
    pub ta_mmap: BTreeMap<String, Vec<usize>>,
    /// Probe key to full node indicator
    pub probes: BTreeMap<String, String>,
    pub targets: BTreeMap<String, TargetSummary>,
}

impl BenchmarkDocument {
    /// Transaction labels to report for a target: the step table labels plus any label observed.
    pub fn report_labels(&self, target: &TargetSummary) -> Vec<String> {
        let mut labels = self
            .ta_mmap
            .keys()
            .chain(target.transaction_stats.keys())
            .cloned()
            .collect::<Vec<_>>();
        labels.sort();
        labels.dedup();
        labels
    }
}
