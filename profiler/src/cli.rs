use std::path::PathBuf;

use clap::Parser;
use ticket_probe_profiler::config::{LabelSource, LoadPolicy, ProfilerConfig};

#[derive(Parser)]
#[command(about, version, long_about = None)]
pub struct CliArgs {
    /// Run documents to profile, folders are searched for `.json` files.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "TICKET_PROBE_PROFILER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Folder to write `benchmark.json` to.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Folder to write the per run traces to, defaults to `traces` in the output folder.
    #[arg(long)]
    pub trace_out: Option<PathBuf>,

    /// Transactions taking at least this many seconds are rated slow.
    #[arg(long)]
    pub slow_secs: Option<f64>,

    /// Leave unreadable run documents out of the benchmark instead of stopping.
    #[arg(long, env = "TICKET_PROBE_SKIP_INVALID")]
    pub skip_invalid: bool,

    /// Label transactions by their step in the scenario instead of the recorded label.
    #[arg(long)]
    pub label_by_step: bool,

    /// Do not print the per run traces to stderr.
    #[arg(long)]
    pub quiet_traces: bool,
}

impl CliArgs {
    /// Override the configuration with the values given on the command line.
    pub fn apply(&self, mut config: ProfilerConfig) -> ProfilerConfig {
        if let Some(out) = &self.out {
            config = config.out_dir(out.clone());
        }
        if let Some(trace_out) = &self.trace_out {
            config = config.trace_dir(trace_out.clone());
        }
        if let Some(secs) = self.slow_secs {
            config = config.slow_secs(secs);
        }
        if self.skip_invalid {
            config = config.load_policy(LoadPolicy::SkipAndReport);
        }
        if self.label_by_step {
            config = config.label_source(LabelSource::StepTable);
        }
        config
    }
}
