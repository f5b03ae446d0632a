use crate::config::{LabelSource, SlownessThreshold, StepTable};
use crate::loader::{LoadedEvent, LoadedRun};
use crate::model::{Counts, SlowTransaction};
use crate::stats::TransactionStats;
use chrono::Datelike;
use std::collections::BTreeMap;

/// Collects duration samples, counters and slow transactions over the runs of a batch.
#[derive(Debug)]
pub struct TransactionAggregator {
    steps: StepTable,
    label_source: LabelSource,
    threshold: SlownessThreshold,
    counts: Counts,
    targets: BTreeMap<String, TargetTally>,
}

#[derive(Debug, Default)]
struct TargetTally {
    counts: Counts,
    samples: BTreeMap<String, Vec<i64>>,
    slow_transactions: Vec<SlowTransaction>,
}

/// Per target outcome of [TransactionAggregator::finalize].
#[derive(Debug, Clone, PartialEq)]
pub struct TargetAggregate {
    pub counts: Counts,
    pub transaction_stats: BTreeMap<String, TransactionStats>,
    pub slow_transactions: Vec<SlowTransaction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub counts: Counts,
    pub targets: BTreeMap<String, TargetAggregate>,
}

impl TransactionAggregator {
    pub fn new(steps: StepTable, label_source: LabelSource, threshold: SlownessThreshold) -> Self {
        Self {
            steps,
            label_source,
            threshold,
            counts: Counts::default(),
            targets: BTreeMap::new(),
        }
    }

    pub fn threshold(&self) -> &SlownessThreshold {
        &self.threshold
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn ingest(&mut self, run: &LoadedRun) {
        let tally = self.targets.entry(run.target.clone()).or_default();

        for counts in [&mut self.counts, &mut tally.counts] {
            counts.sequence_count += 1;
            counts.total_ta_count += run.events.len();
            if run.ok {
                counts.sequence_ok_count += 1;
            }
        }

        for event in &run.events {
            let label = transaction_label(&self.steps, self.label_source, event);
            tally
                .samples
                .entry(label.to_string())
                .or_default()
                .push(event.duration_usecs);

            if event.ok {
                self.counts.ta_ok_count += 1;
                tally.counts.ta_ok_count += 1;
            }

            if !self.threshold.is_slow(label, event.duration_usecs) {
                continue;
            }
            self.counts.slow_ta_count += 1;
            tally.counts.slow_ta_count += 1;

            let run_start = run.start_ts();
            tally.slow_transactions.push(SlowTransaction {
                slot: tally.slow_transactions.len() + 1,
                ta_secs: event.duration_usecs as f64 / 1_000_000.0,
                label: label.to_string(),
                step: event.rank,
                day_tag: run_start.format("%Y-%m-%d").to_string(),
                month_tag: run_start.format("%Y-%m").to_string(),
                year: run_start.year(),
                sequence_start_ts: run_start,
                event_start_ts: event.start_ts,
                start_rel: event.start_rel,
                end_rel: event.end_rel,
                scenario: run.meta.scenario.clone(),
                flavor: run.meta.identity.clone(),
            });
        }
    }

    /// Describe every (target, label) cell that received at least one sample.
    pub fn finalize(self) -> Aggregate {
        let targets = self
            .targets
            .into_iter()
            .map(|(target, tally)| {
                let transaction_stats = tally
                    .samples
                    .iter()
                    .filter_map(|(label, samples)| {
                        match TransactionStats::from_samples(samples) {
                            Ok(stats) => Some((label.clone(), stats)),
                            Err(e) => {
                                log::warn!("No statistics for {label} on {target}: {e}");
                                None
                            }
                        }
                    })
                    .collect();

                let aggregate = TargetAggregate {
                    counts: tally.counts,
                    transaction_stats,
                    slow_transactions: tally.slow_transactions,
                };
                (target, aggregate)
            })
            .collect();

        Aggregate {
            counts: self.counts,
            targets,
        }
    }
}

/// The label a step is accounted under.
fn transaction_label<'a>(
    steps: &'a StepTable,
    label_source: LabelSource,
    event: &'a LoadedEvent,
) -> &'a str {
    let Some(expected) = steps.label(event.rank) else {
        log::debug!(
            "Step {} ({}) is not covered by the step table",
            event.rank,
            event.label
        );
        return &event.label;
    };
    if expected != event.label {
        log::debug!(
            "Step {} was recorded as {} but the step table has {expected}",
            event.rank,
            event.label
        );
    }

    match label_source {
        LabelSource::Recorded => &event.label,
        LabelSource::StepTable => expected,
    }
}
