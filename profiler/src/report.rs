use crate::model::{BenchmarkDocument, Counts, RunTrace, TargetSummary};
use crate::stats::TransactionStats;
use std::io::Write;
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use ticket_probe_instruments::timestamp::format_payload_ts;

#[derive(Tabled)]
pub struct StatsRow {
    #[tabled(rename = "Transaction \\ Aspect")]
    pub label: String,
    #[tabled(display = "usecs")]
    pub min: Option<f64>,
    #[tabled(rename = "Q(1%)", display = "usecs")]
    pub q01: Option<f64>,
    #[tabled(rename = "Q(2%)", display = "usecs")]
    pub q02: Option<f64>,
    #[tabled(rename = "Q(5%)", display = "usecs")]
    pub q05: Option<f64>,
    #[tabled(rename = "Q(10%)", display = "usecs")]
    pub q10: Option<f64>,
    #[tabled(rename = "Q(20%)", display = "usecs")]
    pub q20: Option<f64>,
    #[tabled(rename = "Q(25%)", display = "usecs")]
    pub q25: Option<f64>,
    #[tabled(display = "usecs")]
    pub median: Option<f64>,
    #[tabled(display = "float1")]
    pub mean: Option<f64>,
    #[tabled(display = "float2")]
    pub stddev: Option<f64>,
    #[tabled(rename = "Q(75%)", display = "usecs")]
    pub q75: Option<f64>,
    #[tabled(rename = "Q(80%)", display = "usecs")]
    pub q80: Option<f64>,
    #[tabled(rename = "Q(90%)", display = "usecs")]
    pub q90: Option<f64>,
    #[tabled(rename = "Q(95%)", display = "usecs")]
    pub q95: Option<f64>,
    #[tabled(rename = "Q(98%)", display = "usecs")]
    pub q98: Option<f64>,
    #[tabled(rename = "Q(99%)", display = "usecs")]
    pub q99: Option<f64>,
    #[tabled(display = "usecs")]
    pub max: Option<f64>,
    #[tabled(rename = "N", display = "count")]
    pub count: Option<usize>,
}

impl StatsRow {
    /// A row of absent cells for a label without samples.
    pub fn unobserved(label: &str) -> Self {
        Self::new(label, None)
    }

    pub fn new(label: &str, stats: Option<&TransactionStats>) -> Self {
        let quantile = |percent| stats.and_then(|stats| stats.quantile(percent));
        Self {
            label: label.to_string(),
            min: stats.map(|stats| stats.min as f64),
            q01: quantile(1),
            q02: quantile(2),
            q05: quantile(5),
            q10: quantile(10),
            q20: quantile(20),
            q25: quantile(25),
            median: stats.map(|stats| stats.median_low as f64),
            mean: stats.map(|stats| stats.mean),
            stddev: stats.and_then(|stats| stats.stddev),
            q75: quantile(75),
            q80: quantile(80),
            q90: quantile(90),
            q95: quantile(95),
            q98: quantile(98),
            q99: quantile(99),
            max: stats.map(|stats| stats.max as f64),
            count: stats.map(|stats| stats.count),
        }
    }
}

const ABSENT: &str = "-";

fn usecs(value: &Option<f64>) -> String {
    value.map_or_else(|| ABSENT.to_string(), |v| format!("{:.0}", v))
}

fn float1(value: &Option<f64>) -> String {
    value.map_or_else(|| ABSENT.to_string(), |v| format!("{:.1}", v))
}

fn float2(value: &Option<f64>) -> String {
    value.map_or_else(|| ABSENT.to_string(), |v| format!("{:.2}", v))
}

fn count(value: &Option<usize>) -> String {
    value.map_or_else(|| ABSENT.to_string(), |v| v.to_string())
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Render the benchmark as a markdown report.
pub fn render_report<W: Write + ?Sized>(document: &BenchmarkDocument, writer: &mut W) -> std::io::Result<()> {
    let (Some(start), Some(end)) = (document.ts_frame_start, document.ts_frame_end) else {
        writeln!(writer, "# Report")?;
        writeln!(writer)?;
        writeln!(writer, "No runs were profiled.")?;
        return Ok(());
    };

    let start_date = start.format("%Y-%m-%d").to_string();
    let end_date = end.format("%Y-%m-%d").to_string();
    if start_date == end_date {
        writeln!(writer, "# Report {start_date}")?;
    } else {
        writeln!(writer, "# Report {start_date} - {end_date}")?;
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "Time frame of the report is from {} through {}.",
        format_payload_ts(&start),
        format_payload_ts(&end)
    )?;
    writeln!(writer)?;

    let counts = &document.counts;
    let probes = document.probes.len();
    writeln!(
        writer,
        "{probes} probe{} executed in total {} sequences with {} total transactions probing {} different ticket system instance{}.",
        plural(probes),
        counts.sequence_count,
        counts.total_ta_count,
        document.targets.len(),
        plural(document.targets.len()),
    )?;
    write_validity(writer, document, counts)?;
    writeln!(writer)?;

    writeln!(writer, "{}", overview_table(document))?;
    writeln!(writer)?;

    writeln!(writer, "## Targets")?;
    for (target, summary) in &document.targets {
        writeln!(writer)?;
        render_target(writer, document, target, summary)?;
    }

    Ok(())
}

fn write_validity<W: Write + ?Sized>(
    writer: &mut W,
    document: &BenchmarkDocument,
    counts: &Counts,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "{} of the {} total sequences (runs) and {} of the {} total transactions were valid.",
        counts.sequence_ok_count,
        counts.sequence_count,
        counts.ta_ok_count,
        counts.total_ta_count
    )?;
    writeln!(
        writer,
        "{} of the {} total transactions were rated as slow (taking {} seconds or longer).",
        counts.slow_ta_count, counts.total_ta_count, document.slow_means_more_than_secs
    )?;
    for (label, secs) in &document.slow_secs_by_label {
        writeln!(writer, "For {label} transactions the limit is {secs} seconds.")?;
    }
    Ok(())
}

/// Quantities as rows, targets as columns.
fn overview_table(document: &BenchmarkDocument) -> Table {
    let mut builder = Builder::default();
    builder.push_record(
        std::iter::once("Quantity \\ Target".to_string()).chain(document.targets.keys().cloned()),
    );

    let quantities: [(&str, fn(&TargetSummary) -> String); 8] = [
        ("From", |s| format_payload_ts(&s.first_start_ts)),
        ("Through", |s| format_payload_ts(&s.last_end_ts)),
        ("Probes", |s| s.probes.len().to_string()),
        ("Runs", |s| s.counts.sequence_count.to_string()),
        ("Runs OK", |s| s.counts.sequence_ok_count.to_string()),
        ("TAs", |s| s.counts.total_ta_count.to_string()),
        ("TAs OK", |s| s.counts.ta_ok_count.to_string()),
        ("TAs Slow", |s| s.counts.slow_ta_count.to_string()),
    ];
    for (name, value) in quantities {
        builder.push_record(
            std::iter::once(name.to_string()).chain(document.targets.values().map(value)),
        );
    }

    let mut table = builder.build();
    table.with(Style::markdown());
    table
}

fn render_target<W: Write + ?Sized>(
    writer: &mut W,
    document: &BenchmarkDocument,
    target: &str,
    summary: &TargetSummary,
) -> std::io::Result<()> {
    writeln!(writer, "### Instance - {target}")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "Time frame of the report for the {target} instance is from {} through {}.",
        format_payload_ts(&summary.first_start_ts),
        format_payload_ts(&summary.last_end_ts)
    )?;
    writeln!(writer)?;

    let probes = summary.probes.len();
    writeln!(
        writer,
        "{probes} probe{} executed in total {} sequences with {} total transactions probing the {target} instance.",
        plural(probes),
        summary.counts.sequence_count,
        summary.counts.total_ta_count,
    )?;
    write_validity(writer, document, &summary.counts)?;
    writeln!(writer)?;

    writeln!(writer, "#### Transaction Statistics")?;
    writeln!(writer)?;
    writeln!(writer, "{}", stats_table(document, summary))?;

    Ok(())
}

pub fn stats_table(document: &BenchmarkDocument, summary: &TargetSummary) -> Table {
    let rows = document
        .report_labels(summary)
        .iter()
        .map(|label| match summary.transaction_stats.get(label) {
            Some(stats) => StatsRow::new(label, Some(stats)),
            None => StatsRow::unobserved(label),
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(Style::markdown());
    table
}

/// Marker bar of one `*` per full alert unit, empty below one unit.
pub fn alert_bar(duration_usecs: i64, alert_unit_usecs: i64) -> String {
    if alert_unit_usecs <= 0 || duration_usecs < alert_unit_usecs {
        return String::new();
    }
    format!(" {}", "*".repeat((duration_usecs / alert_unit_usecs) as usize))
}

/// Render the console view of one run: a header line and one line per step.
pub fn render_run_trace<W: Write + ?Sized>(
    trace: &RunTrace,
    alert_unit_usecs: i64,
    writer: &mut W,
) -> std::io::Result<()> {
    let duty_cycle = trace
        .duty_cycle_percent
        .map_or_else(|| "n/a".to_string(), |percent| format!("{percent:.3}%"));
    writeln!(writer)?;
    writeln!(
        writer,
        "{}:{} -> {} => {:5.2} secs duration ({duty_cycle} duty-cycle) started {} and status {}",
        trace.scenario,
        trace.probe,
        trace.target,
        trace.total_secs,
        format_payload_ts(&trace.start_ts),
        if trace.ok { "OK" } else { "FAIL" }
    )?;
    writeln!(writer)?;

    for step in &trace.trace {
        writeln!(
            writer,
            "- {:2}: {:6.3} -> {:6.3} [{:8} usecs] for {:28}{}",
            step.step,
            step.start_rel,
            step.end_rel,
            step.duration_usecs,
            step.label,
            alert_bar(step.duration_usecs, alert_unit_usecs)
        )?;
    }

    Ok(())
}
