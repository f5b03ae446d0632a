use crate::aggregator::{Aggregate, TransactionAggregator};
use crate::config::{ConfigError, ProfilerConfig, StepTable};
use crate::loader::LoadedRun;
use crate::model::{BenchmarkDocument, RunTrace, TargetSummary, TraceStep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// File name of the benchmark document in the output folder.
pub const BENCHMARK_FILE_NAME: &str = "benchmark.json";

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to create output folder {}: {source}", path.display())]
    CreateFolder {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot name a trace after {}", path.display())]
    TraceName { path: PathBuf },
    #[error("Runs {} and {} would both write the trace {name}", first.display(), second.display())]
    DuplicateTrace {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Run level facts of a target that the aggregator does not track.
#[derive(Debug)]
struct TargetRuns {
    probes: Vec<String>,
    scenarios: Vec<String>,
    flavors: Vec<String>,
    first_start_ts: DateTime<Utc>,
    last_end_ts: DateTime<Utc>,
    run_start_ts: Vec<DateTime<Utc>>,
    run_end_ts: Vec<DateTime<Utc>>,
    total_secs: Vec<f64>,
    duty_secs: Vec<f64>,
    duty_cycles_percent: Vec<Option<f64>>,
}

impl TargetRuns {
    fn new(run: &LoadedRun) -> Self {
        Self {
            probes: Vec::new(),
            scenarios: Vec::new(),
            flavors: Vec::new(),
            first_start_ts: run.start_ts(),
            last_end_ts: run.end_ts,
            run_start_ts: Vec::new(),
            run_end_ts: Vec::new(),
            total_secs: Vec::new(),
            duty_secs: Vec::new(),
            duty_cycles_percent: Vec::new(),
        }
    }

    fn add(&mut self, run: &LoadedRun, trace: &RunTrace) {
        push_distinct(&mut self.probes, &run.probe);
        push_distinct(&mut self.scenarios, &run.meta.scenario);
        push_distinct(&mut self.flavors, &run.meta.identity);
        self.first_start_ts = self.first_start_ts.min(run.start_ts());
        self.last_end_ts = self.last_end_ts.max(run.end_ts);
        self.run_start_ts.push(run.start_ts());
        self.run_end_ts.push(run.end_ts);
        self.total_secs.push(trace.total_secs);
        self.duty_secs.push(trace.duty_secs);
        self.duty_cycles_percent.push(trace.duty_cycle_percent);
    }
}

fn push_distinct(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|known| known == value) {
        values.push(value.to_string());
    }
}

/// Builds the [BenchmarkDocument] of a batch, one run at a time.
#[derive(Debug)]
pub struct BenchmarkBuilder {
    steps: StepTable,
    aggregator: TransactionAggregator,
    frame: Option<(DateTime<Utc>, DateTime<Utc>)>,
    probes: BTreeMap<String, String>,
    targets: BTreeMap<String, TargetRuns>,
}

impl BenchmarkBuilder {
    pub fn new(config: &ProfilerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            steps: config.steps.clone(),
            aggregator: TransactionAggregator::new(
                config.steps.clone(),
                config.label_source,
                config.slowness()?,
            ),
            frame: None,
            probes: BTreeMap::new(),
            targets: BTreeMap::new(),
        })
    }

    /// Account for a run and return its trace.
    pub fn add_run(&mut self, run: &LoadedRun) -> RunTrace {
        let trace = run_trace(run);

        self.aggregator.ingest(run);
        log::debug!(
            "Accounted {} of {} transactions as slow so far",
            self.aggregator.counts().slow_ta_count,
            self.aggregator.counts().total_ta_count
        );
        self.probes
            .entry(run.probe.clone())
            .or_insert_with(|| run.meta.node_indicator.clone());
        self.frame = Some(match self.frame {
            Some((start, end)) => (start.min(run.start_ts()), end.max(run.end_ts)),
            None => (run.start_ts(), run.end_ts),
        });
        self.targets
            .entry(run.target.clone())
            .or_insert_with(|| TargetRuns::new(run))
            .add(run, &trace);

        trace
    }

    pub fn finish(self) -> BenchmarkDocument {
        let threshold = self.aggregator.threshold().clone();
        let Aggregate { counts, targets } = self.aggregator.finalize();

        let mut runs_by_target = self.targets;
        let targets = targets
            .into_iter()
            .filter_map(|(target, aggregate)| {
                let Some(runs) = runs_by_target.remove(&target) else {
                    log::warn!("Target {target} has transactions but no runs");
                    return None;
                };
                let summary = TargetSummary {
                    probes: runs.probes,
                    scenarios: runs.scenarios,
                    flavors: runs.flavors,
                    transaction_stats: aggregate.transaction_stats,
                    first_start_ts: runs.first_start_ts,
                    last_end_ts: runs.last_end_ts,
                    counts: aggregate.counts,
                    run_start_ts: runs.run_start_ts,
                    run_end_ts: runs.run_end_ts,
                    total_secs: runs.total_secs,
                    duty_secs: runs.duty_secs,
                    duty_cycles_percent: runs.duty_cycles_percent,
                    slow_transactions: aggregate.slow_transactions,
                };
                Some((target, summary))
            })
            .collect();

        BenchmarkDocument {
            ts_frame_start: self.frame.map(|(start, _)| start),
            ts_frame_end: self.frame.map(|(_, end)| end),
            counts,
            slow_means_more_than_secs: threshold.default_secs(),
            slow_secs_by_label: threshold.overrides_secs(),
            step_to_ta: self.steps.step_to_label(),
            ta_mmap: self.steps.label_to_steps(),
            probes: self.probes,
            targets,
        }
    }
}

/// The trace of a single run with its duty cycle.
pub fn run_trace(run: &LoadedRun) -> RunTrace {
    let duty_secs = run.duty_usecs() as f64 / 1_000_000.0;
    let total_secs = run.meta.total_secs;

    RunTrace {
        scenario: run.meta.scenario.clone(),
        probe: run.probe.clone(),
        target: run.target.clone(),
        ok: run.ok,
        start_ts: run.start_ts(),
        end_ts: run.end_ts,
        total_secs,
        duty_secs,
        duty_cycle_percent: (total_secs > 0.0).then(|| 100.0 * duty_secs / total_secs),
        trace: run
            .events
            .iter()
            .map(|event| TraceStep {
                step: event.rank,
                label: event.label.clone(),
                duration_usecs: event.duration_usecs,
                ok: event.ok,
                start_rel: event.start_rel,
                start_ts: event.start_ts,
                end_rel: event.end_rel,
            })
            .collect(),
    }
}

/// Write the benchmark document into `out_dir`, creating the folder if needed.
pub fn write_benchmark(document: &BenchmarkDocument, out_dir: &Path) -> Result<PathBuf, OutputError> {
    write_json(document, out_dir, BENCHMARK_FILE_NAME)
}

/// Write a run trace into `trace_dir` under the file name of the run document it came from.
pub fn write_trace(trace: &RunTrace, source: &Path, trace_dir: &Path) -> Result<PathBuf, OutputError> {
    write_json(trace, trace_dir, trace_name(source)?)
}

fn trace_name(source: &Path) -> Result<&str, OutputError> {
    source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| OutputError::TraceName {
            path: source.to_path_buf(),
        })
}

/// Make sure no two sources share a trace name, before any trace is written.
pub fn check_trace_names<'a, I>(sources: I) -> Result<(), OutputError>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut seen = HashMap::new();
    for source in sources {
        let name = trace_name(source)?;
        if let Some(first) = seen.insert(name, source) {
            return Err(OutputError::DuplicateTrace {
                name: name.to_string(),
                first: first.to_path_buf(),
                second: source.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn write_json<T: Serialize>(value: &T, folder: &Path, name: &str) -> Result<PathBuf, OutputError> {
    std::fs::create_dir_all(folder).map_err(|source| OutputError::CreateFolder {
        path: folder.to_path_buf(),
        source,
    })?;

    let path = folder.join(name);
    let content = serde_json::to_vec_pretty(value)?;
    std::fs::write(&path, content).map_err(|source| OutputError::Write {
        path: path.clone(),
        source,
    })?;
    log::debug!("Wrote {}", path.display());

    Ok(path)
}
