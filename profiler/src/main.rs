#[macro_use]
extern crate log;

use anyhow::Context;
use clap::Parser as _;
use std::io::Write as _;

use ticket_probe_profiler::config::ProfilerConfig;
use ticket_probe_profiler::profile;
use ticket_probe_profiler::report::render_report;

mod cli;

const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    env_logger::try_init()?;

    let args = cli::CliArgs::parse();
    info!("{CRATE_NAME} {CRATE_VERSION}");

    let config = match &args.config {
        Some(path) => {
            debug!("Using configuration file: {}", path.display());
            ProfilerConfig::load(path)?
        }
        None => ProfilerConfig::default(),
    };
    let config = args.apply(config);

    let mut stderr = std::io::stderr().lock();
    let console: Option<&mut dyn std::io::Write> = if args.quiet_traces {
        None
    } else {
        Some(&mut stderr)
    };
    let outcome = profile(&args.paths, &config, console)?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout)?;
    render_report(&outcome.benchmark, &mut stdout).context("Failed to write report")?;
    stdout.flush()?;

    for skipped in &outcome.skipped {
        error!("Left out {}: {skipped}", skipped.path().display());
    }
    info!(
        "Profiled {} runs into {}",
        outcome.benchmark.counts.sequence_count,
        outcome.benchmark_path.display()
    );

    Ok(())
}
