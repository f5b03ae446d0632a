use anyhow::Context;
use std::io::Write;
use std::path::PathBuf;

pub mod aggregator;
pub mod benchmark;
pub mod config;
pub mod loader;
pub mod model;
pub mod report;
pub mod stats;
pub mod target;

use crate::benchmark::{check_trace_names, write_benchmark, write_trace, BenchmarkBuilder};
use crate::config::ProfilerConfig;
use crate::loader::{LoadError, RunCorpusLoader};
use crate::model::BenchmarkDocument;
use crate::report::render_run_trace;

/// What a profiling batch produced.
#[derive(Debug)]
pub struct ProfileOutcome {
    pub benchmark: BenchmarkDocument,
    pub benchmark_path: PathBuf,
    pub trace_paths: Vec<PathBuf>,
    /// Documents left out under the skip and report policy
    pub skipped: Vec<LoadError>,
}

/// Profile the run documents found at `inputs`.
///
/// Writes one trace per run and the benchmark document to the configured folders. Runs are
/// taken target by target. When `console` is given, every run trace is also rendered to it.
pub fn profile(
    inputs: &[PathBuf],
    config: &ProfilerConfig,
    mut console: Option<&mut dyn Write>,
) -> anyhow::Result<ProfileOutcome> {
    let corpus = RunCorpusLoader::new(config.load_policy, config.targets.clone())
        .load_inputs(inputs)
        .context("Failed to load run documents")?;
    if corpus.is_partial() {
        log::warn!(
            "Benchmark is partial, {} inputs were left out",
            corpus.skipped.len()
        );
    }
    check_trace_names(corpus.runs.iter().map(|run| run.source.as_path()))?;

    let mut builder = BenchmarkBuilder::new(config).context("Invalid profiler configuration")?;
    let trace_dir = config.trace_dir_or_default();
    let mut trace_paths = Vec::with_capacity(corpus.runs.len());
    for (target, runs) in corpus.by_target() {
        log::info!("Profiling {} runs against {target}", runs.len());
        for run in runs {
            let trace = builder.add_run(run);
            if let Some(console) = console.as_deref_mut() {
                render_run_trace(&trace, config.alert_unit_usecs, console)?;
            }
            trace_paths.push(write_trace(&trace, &run.source, &trace_dir)?);
        }
    }

    let benchmark = builder.finish();
    let benchmark_path = write_benchmark(&benchmark, &config.out_dir)?;
    log::info!("Benchmark written to {}", benchmark_path.display());

    Ok(ProfileOutcome {
        benchmark,
        benchmark_path,
        trace_paths,
        skipped: corpus.skipped,
    })
}
