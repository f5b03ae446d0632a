use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentiles reported for every transaction label.
pub const PERCENTILE_LADDER: [usize; 15] = [1, 2, 5, 10, 20, 25, 33, 50, 67, 75, 80, 90, 95, 98, 99];

/// Number of intervals the samples are split into before picking from the ladder.
const CUT_INTERVALS: usize = 100;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatsError {
    #[error("No samples to describe")]
    NoSamples,
    #[error("The {mean} mean is undefined for the negative sample {value}us")]
    NegativeSample { mean: &'static str, value: i64 },
}

/// Descriptive statistics of the durations, in microseconds, observed for one transaction label
/// on one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStats {
    /// Absent when a sample is negative
    pub geometric_mean: Option<f64>,
    /// Absent when a sample is negative
    pub harmonic_mean: Option<f64>,
    pub max: i64,
    pub median_high: i64,
    pub median_low: i64,
    pub mean: f64,
    pub min: i64,
    /// Keyed by zero padded percent, `01%` through `99%`
    pub quantiles: BTreeMap<String, f64>,
    /// Absent with fewer than two samples
    pub stddev: Option<f64>,
    /// Absent with fewer than two samples
    pub variance: Option<f64>,
    #[serde(rename = "N")]
    pub count: usize,
}

impl TransactionStats {
    /// Describe a non-empty set of samples.
    ///
    /// The order of the samples does not matter. A zero sample forces the geometric and harmonic
    /// means to zero, a negative sample leaves them absent and is logged.
    pub fn from_samples(samples: &[i64]) -> Result<Self, StatsError> {
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let (min, max) = match (sorted.first(), sorted.last()) {
            (Some(min), Some(max)) => (*min, *max),
            _ => return Err(StatsError::NoSamples),
        };
        let count = sorted.len();
        let mean = mean(&sorted);
        let variance = sample_variance(&sorted, mean);

        let cuts = cut_points(&sorted, CUT_INTERVALS);
        let quantiles = PERCENTILE_LADDER
            .iter()
            .map(|percent| (quantile_key(*percent), cuts[percent - 1]))
            .collect();

        Ok(Self {
            geometric_mean: geometric_mean(&sorted)
                .map_err(|e| log::warn!("{e}"))
                .ok(),
            harmonic_mean: harmonic_mean(&sorted)
                .map_err(|e| log::warn!("{e}"))
                .ok(),
            max,
            median_high: sorted[count / 2],
            median_low: sorted[(count - 1) / 2],
            mean,
            min,
            quantiles,
            stddev: variance.map(f64::sqrt),
            variance,
            count,
        })
    }

    /// The value at `percent`, if it is part of [PERCENTILE_LADDER].
    pub fn quantile(&self, percent: usize) -> Option<f64> {
        self.quantiles.get(&quantile_key(percent)).copied()
    }
}

pub fn quantile_key(percent: usize) -> String {
    format!("{percent:02}%")
}

/// Split sorted samples into `n` intervals and return the `n - 1` cut points.
///
/// Uses the inclusive method: the cut point for `i / n` is the linear interpolation between the
/// order statistics around position `i * (len - 1) / n`, so the minimum and maximum are the 0th
/// and 100th percentiles. A single sample is every cut point.
pub fn cut_points(sorted: &[i64], n: usize) -> Vec<f64> {
    if n < 2 {
        return Vec::new();
    }
    match sorted {
        [] => Vec::new(),
        [only] => vec![*only as f64; n - 1],
        _ => {
            let m = sorted.len() - 1;
            (1..n)
                .map(|i| {
                    let (j, delta) = (i * m / n, i * m % n);
                    let weighted = sorted[j] as i128 * (n - delta) as i128
                        + sorted[j + 1] as i128 * delta as i128;
                    weighted as f64 / n as f64
                })
                .collect()
        }
    }
}

pub fn mean(samples: &[i64]) -> f64 {
    samples.iter().map(|v| *v as i128).sum::<i128>() as f64 / samples.len() as f64
}

/// Unbiased sample variance, absent for fewer than two samples.
fn sample_variance(samples: &[i64], mean: f64) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let squares = samples
        .iter()
        .map(|v| (*v as f64 - mean).powi(2))
        .sum::<f64>();
    Some(squares / (samples.len() - 1) as f64)
}

pub fn geometric_mean(samples: &[i64]) -> Result<f64, StatsError> {
    match degenerate(samples, "geometric")? {
        Some(zero) => Ok(zero),
        None => Ok((samples.iter().map(|v| (*v as f64).ln()).sum::<f64>() / samples.len() as f64).exp()),
    }
}

pub fn harmonic_mean(samples: &[i64]) -> Result<f64, StatsError> {
    match degenerate(samples, "harmonic")? {
        Some(zero) => Ok(zero),
        None => Ok(samples.len() as f64 / samples.iter().map(|v| 1.0 / *v as f64).sum::<f64>()),
    }
}

/// Check samples before taking logarithms or reciprocals.
///
/// Returns `Some(0.0)` when a zero sample decides the mean.
fn degenerate(samples: &[i64], mean: &'static str) -> Result<Option<f64>, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::NoSamples);
    }
    if let Some(value) = samples.iter().find(|v| **v < 0) {
        return Err(StatsError::NegativeSample {
            mean,
            value: *value,
        });
    }
    if samples.contains(&0) {
        return Ok(Some(0.0));
    }
    Ok(None)
}
