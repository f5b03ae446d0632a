use chrono::{DateTime, TimeZone, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use ticket_probe_instruments::Clocking;
use ticket_probe_profiler::benchmark::{OutputError, BENCHMARK_FILE_NAME};
use ticket_probe_profiler::config::{LoadPolicy, ProfilerConfig};
use ticket_probe_profiler::loader::{CorpusError, LoadError};
use ticket_probe_profiler::model::{BenchmarkDocument, RunTrace};
use ticket_probe_profiler::profile;
use ticket_probe_profiler::report::render_report;
use ticket_probe_run_store::{ConnectionMode, NodeIndicator, RunContext, RunStore};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 8, 28, 14, 3, 22).unwrap()
}

fn after(usecs: i64) -> DateTime<Utc> {
    start() + chrono::Duration::microseconds(usecs)
}

/// Record a run of LOGIN followed by SERVER_INFO, starting `offset` microseconds after the epoch
/// of the test.
fn record_run(store_dir: &Path, offset: i64, server_info_usecs: i64, server_info_ok: bool) -> PathBuf {
    let mut store = RunStore::create_on_node(
        RunContext::new("adhoc", after(offset))
            .scenario("twins")
            .target("https://jiraabcd.example.com")
            .mode(ConnectionMode::OnSite)
            .project("PROJ"),
        store_dir,
        NodeIndicator::from_host_name("probe-one"),
    );
    store.add(
        "LOGIN",
        true,
        Clocking::new(after(offset), after(offset + 500_000)),
        "",
    );
    store.add(
        "SERVER_INFO",
        server_info_ok,
        Clocking::new(
            after(offset + 500_000),
            after(offset + 500_000 + server_info_usecs),
        ),
        "",
    );
    store
        .dump(after(offset + 2_500_000), false)
        .expect("Failed to dump run")
}

fn config(root: &Path) -> ProfilerConfig {
    ProfilerConfig::default()
        .out_dir(root.join("out"))
        .trace_dir(root.join("traces"))
}

#[test]
fn two_runs_against_one_target() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store_dir = dir.path().join("store");
    let first = record_run(&store_dir, 0, 1_600_000, true);
    let second = record_run(&store_dir, 10_000_000, 300_000, false);

    let mut console = Vec::new();
    let outcome = profile(
        &[store_dir],
        &config(dir.path()),
        Some(&mut console as &mut dyn std::io::Write),
    )?;

    let benchmark = &outcome.benchmark;
    assert_eq!(benchmark.counts.sequence_count, 2);
    assert_eq!(benchmark.counts.sequence_ok_count, 1);
    assert_eq!(benchmark.counts.total_ta_count, 4);
    assert_eq!(benchmark.counts.ta_ok_count, 3);
    assert_eq!(benchmark.counts.slow_ta_count, 1);
    assert_eq!(benchmark.ts_frame_start, Some(start()));
    assert_eq!(benchmark.ts_frame_end, Some(after(12_500_000)));

    let prod = &benchmark.targets["prod"];
    let server_info = &prod.transaction_stats["SERVER_INFO"];
    assert_eq!(server_info.count, 2);
    assert_eq!(server_info.min, 300_000);
    assert_eq!(server_info.max, 1_600_000);
    assert_eq!(prod.transaction_stats["LOGIN"].count, 2);
    assert_eq!(prod.slow_transactions.len(), 1);
    assert_eq!(prod.slow_transactions[0].label, "SERVER_INFO");
    assert_eq!(prod.slow_transactions[0].step, 2);
    assert_eq!(prod.duty_secs, vec![2.1, 0.8]);
    assert!(outcome.skipped.is_empty());

    // One trace per run, named after its run document
    assert_eq!(outcome.trace_paths.len(), 2);
    for (source, trace_path) in [first, second].iter().zip(&outcome.trace_paths) {
        assert_eq!(source.file_name(), trace_path.file_name());
        assert!(trace_path.starts_with(dir.path().join("traces")));
    }
    let trace: RunTrace = serde_json::from_reader(File::open(&outcome.trace_paths[1])?)?;
    assert!(!trace.ok);
    assert_eq!(trace.trace[1].duration_usecs, 300_000);
    assert_eq!(trace.duty_cycle_percent, Some(32.0));

    let written: BenchmarkDocument = serde_json::from_reader(File::open(&outcome.benchmark_path)?)?;
    assert_eq!(outcome.benchmark_path, dir.path().join("out").join("benchmark.json"));
    assert_eq!(written.counts, benchmark.counts);
    assert_eq!(written.targets["prod"].transaction_stats["SERVER_INFO"].count, 2);

    let console = String::from_utf8(console)?;
    assert!(console.contains("twins:"));
    assert!(console.contains(" -> prod => "));
    assert!(console.contains("and status FAIL"));

    let mut report = Vec::new();
    render_report(benchmark, &mut report)?;
    let report = String::from_utf8(report)?;
    assert!(report.contains("# Report 2022-08-28"));
    assert!(report.contains("### Instance - prod"));

    Ok(())
}

#[test]
fn fail_fast_names_the_bad_document() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store_dir = dir.path().join("store");
    record_run(&store_dir, 0, 1_600_000, true);
    record_run(&store_dir, 10_000_000, 300_000, true);
    let broken = store_dir.join("zz-broken.json");
    std::fs::write(&broken, "{\"_meta\": ")?;

    let err = profile(&[store_dir], &config(dir.path()), None)
        .expect_err("A broken document must stop the batch");
    let corpus_error = err
        .downcast_ref::<CorpusError>()
        .expect("Load failure must be a corpus error");
    assert_eq!(corpus_error.loaded, 2);
    assert_eq!(corpus_error.total, 3);
    assert_eq!(corpus_error.source.path(), broken);
    assert!(matches!(corpus_error.source, LoadError::Parse { .. }));
    assert!(!dir.path().join("out").join("benchmark.json").exists());

    Ok(())
}

#[test]
fn skip_and_report_keeps_the_good_documents() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store_dir = dir.path().join("store");
    record_run(&store_dir, 0, 1_600_000, true);

    // A run that was never dumped
    let unfinished = RunStore::create_on_node(
        RunContext::new("adhoc", after(5_000_000)).target("https://jira-test.example.com"),
        &store_dir,
        NodeIndicator::from_host_name("probe-two"),
    );
    let unfinished_path = unfinished.path();
    ticket_probe_run_store::store_run_document(
        unfinished.document(),
        File::create(&unfinished_path)?,
    )?;

    let config = config(dir.path()).load_policy(LoadPolicy::SkipAndReport);
    let outcome = profile(&[store_dir], &config, None)?;

    assert_eq!(outcome.benchmark.counts.sequence_count, 1);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].path(), unfinished_path);
    assert!(matches!(outcome.skipped[0], LoadError::Unfinished { .. }));
    assert!(!outcome.benchmark.targets.contains_key("test"));

    Ok(())
}

#[test]
fn traces_default_to_their_own_folder() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store_dir = dir.path().join("store");
    record_run(&store_dir, 0, 1_600_000, true);

    let out_dir = dir.path().join("out");
    let outcome = profile(&[store_dir], &ProfilerConfig::default().out_dir(out_dir.clone()), None)?;

    assert_eq!(outcome.benchmark_path, out_dir.join(BENCHMARK_FILE_NAME));
    assert_eq!(outcome.trace_paths.len(), 1);
    assert!(outcome.trace_paths[0].starts_with(out_dir.join("traces")));
    assert!(outcome.trace_paths[0].exists());

    Ok(())
}

#[test]
fn runs_sharing_a_document_name_are_refused() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // Same identity, start time and node, so both stores pick the same file name
    let first = record_run(&dir.path().join("in").join("a"), 0, 1_600_000, true);
    let second = record_run(&dir.path().join("in").join("b"), 0, 300_000, true);
    assert_eq!(first.file_name(), second.file_name());

    let out_dir = dir.path().join("out");
    let err = profile(
        &[dir.path().join("in")],
        &ProfilerConfig::default().out_dir(out_dir.clone()),
        None,
    )
    .expect_err("Two runs must not share a trace");
    match err.downcast_ref::<OutputError>() {
        Some(OutputError::DuplicateTrace {
            first: seen_first,
            second: seen_second,
            ..
        }) => {
            assert_eq!(seen_first, &first);
            assert_eq!(seen_second, &second);
        }
        other => panic!("Expected a duplicate trace error, got {other:?}"),
    }
    assert!(!out_dir.exists());

    Ok(())
}
