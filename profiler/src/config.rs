use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Steps at least this long get one alert marker per multiple in the console trace.
pub const HALF_SECOND_OF_USECS: i64 = 500_000;

/// Transactions that take this long or longer are rated as slow.
pub const DEFAULT_SLOW_SECS: f64 = 3.0 * HALF_SECOND_OF_USECS as f64 / 1_000_000.0;

/// Where the benchmark document is written when nothing else is configured.
pub const DEFAULT_OUT_DIR: &str = "out";

/// Folder inside the output folder that holds the per run traces by default.
pub const DEFAULT_TRACE_SUBDIR: &str = "traces";

/// Transaction labels of the 27 step scenario, in step order.
const DEFAULT_STEPS: [&str; 27] = [
    "LOGIN",
    "SERVER_INFO",
    "PROJECTS",
    "CREATE_ISSUE",
    "ISSUE_EXISTS",
    "CREATE_ISSUE",
    "ISSUE_EXISTS",
    "EXECUTE_JQL",
    "AMEND_ISSUE_DESCRIPTION",
    "ADD_COMMENT",
    "UPDATE_ISSUE_FIELD",
    "UPDATE_ISSUE_FIELD",
    "CREATE_DUPLICATES_ISSUE_LINK",
    "GET_ISSUE_STATUS",
    "SET_ISSUE_STATUS",
    "SET_ISSUE_STATUS",
    "GET_ISSUE_STATUS",
    "ADD_COMMENT",
    "SET_ORIGINAL_ESTIMATE",
    "GET_ISSUE_STATUS",
    "SET_ISSUE_STATUS",
    "GET_ISSUE_STATUS",
    "CREATE_COMPONENT",
    "RELATE_ISSUE_TO_COMPONENT",
    "LOAD_ISSUE",
    "ADD_COMMENT",
    "ADD_COMMENT",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Slowness threshold for {scope} must be a positive number of seconds, got {secs}")]
    InvalidThreshold { scope: String, secs: f64 },
}

/// What to do when a run document cannot be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPolicy {
    /// Stop at the first bad document
    #[default]
    FailFast,
    /// Leave bad documents out and report them next to the loaded corpus
    SkipAndReport,
}

/// Where the aggregator takes the transaction label of a step from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelSource {
    /// The label recorded with the event
    #[default]
    Recorded,
    /// The step table entry for the event's rank, if the table has one
    StepTable,
}

/// The ordered transaction labels of a scenario, step `n` being entry `n - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct StepTable(Vec<String>);

impl Default for StepTable {
    fn default() -> Self {
        Self(DEFAULT_STEPS.iter().map(|label| label.to_string()).collect())
    }
}

impl StepTable {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    /// Number of steps in the scenario.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The label of a 1-based step, if the table covers it.
    pub fn label(&self, step: usize) -> Option<&str> {
        step.checked_sub(1)
            .and_then(|index| self.0.get(index))
            .map(String::as_str)
    }

    pub fn step_to_label(&self) -> BTreeMap<usize, String> {
        self.0
            .iter()
            .enumerate()
            .map(|(index, label)| (index + 1, label.clone()))
            .collect()
    }

    /// The reverse mapping, from each label to all of its steps in ascending order.
    pub fn label_to_steps(&self) -> BTreeMap<String, Vec<usize>> {
        self.0
            .iter()
            .enumerate()
            .fold(BTreeMap::new(), |mut acc, (index, label)| {
                acc.entry(label.clone())
                    .or_insert_with(Vec::new)
                    .push(index + 1);
                acc
            })
    }
}

/// Rules that turn the first host name label of a target URL into a target key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TargetAliases {
    /// Substring replacements, applied to labels without a `-`
    pub replace: BTreeMap<String, String>,
    /// Whole key renames, applied last
    pub rename: BTreeMap<String, String>,
}

impl Default for TargetAliases {
    fn default() -> Self {
        Self {
            replace: BTreeMap::from([("jiraabcd".to_string(), "prod".to_string())]),
            rename: BTreeMap::from([
                ("154".to_string(), "cloud-prod".to_string()),
                ("dilettant".to_string(), "cloud-ref".to_string()),
            ]),
        }
    }
}

/// Duration at or above which a transaction is rated slow.
///
/// One threshold applies to every label unless a label has an override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlownessThreshold {
    default_usecs: i64,
    per_label: BTreeMap<String, i64>,
}

impl SlownessThreshold {
    pub fn from_secs(default_secs: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            default_usecs: secs_to_usecs("all transactions", default_secs)?,
            per_label: BTreeMap::new(),
        })
    }

    pub fn with_label_secs(mut self, label: &str, secs: f64) -> Result<Self, ConfigError> {
        self.per_label
            .insert(label.to_string(), secs_to_usecs(label, secs)?);
        Ok(self)
    }

    pub fn default_usecs(&self) -> i64 {
        self.default_usecs
    }

    pub fn default_secs(&self) -> f64 {
        self.default_usecs as f64 / 1_000_000.0
    }

    /// Overrides in seconds, by label.
    pub fn overrides_secs(&self) -> BTreeMap<String, f64> {
        self.per_label
            .iter()
            .map(|(label, usecs)| (label.clone(), *usecs as f64 / 1_000_000.0))
            .collect()
    }

    pub fn usecs_for(&self, label: &str) -> i64 {
        self.per_label
            .get(label)
            .copied()
            .unwrap_or(self.default_usecs)
    }

    pub fn is_slow(&self, label: &str, duration_usecs: i64) -> bool {
        duration_usecs >= self.usecs_for(label)
    }
}

impl Default for SlownessThreshold {
    fn default() -> Self {
        Self {
            default_usecs: 3 * HALF_SECOND_OF_USECS,
            per_label: BTreeMap::new(),
        }
    }
}

fn secs_to_usecs(scope: &str, secs: f64) -> Result<i64, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidThreshold {
            scope: scope.to_string(),
            secs,
        });
    }
    Ok((secs * 1_000_000.0).round() as i64)
}

/// Configuration of a profiling batch.
///
/// Every field has a default, so a config file only needs to name what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub steps: StepTable,
    pub slow_secs: f64,
    pub slow_secs_by_label: BTreeMap<String, f64>,
    pub label_source: LabelSource,
    pub load_policy: LoadPolicy,
    pub out_dir: PathBuf,
    /// Folder for the per run traces, `traces` inside the output folder if not set
    pub trace_dir: Option<PathBuf>,
    pub alert_unit_usecs: i64,
    pub targets: TargetAliases,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            steps: StepTable::default(),
            slow_secs: DEFAULT_SLOW_SECS,
            slow_secs_by_label: BTreeMap::new(),
            label_source: LabelSource::default(),
            load_policy: LoadPolicy::default(),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            trace_dir: None,
            alert_unit_usecs: HALF_SECOND_OF_USECS,
            targets: TargetAliases::default(),
        }
    }
}

impl ProfilerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Set the default `slow_secs` threshold
    pub fn slow_secs(mut self, secs: f64) -> Self {
        self.slow_secs = secs;
        self
    }

    /// Set the `load_policy`
    pub fn load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Set the `out_dir`
    pub fn out_dir(mut self, dir: PathBuf) -> Self {
        self.out_dir = dir;
        self
    }

    /// Set the `trace_dir`
    pub fn trace_dir(mut self, dir: PathBuf) -> Self {
        self.trace_dir = Some(dir);
        self
    }

    /// Set the `label_source`
    pub fn label_source(mut self, source: LabelSource) -> Self {
        self.label_source = source;
        self
    }

    pub fn trace_dir_or_default(&self) -> PathBuf {
        self.trace_dir
            .clone()
            .unwrap_or_else(|| self.out_dir.join(DEFAULT_TRACE_SUBDIR))
    }

    /// Build the validated slowness threshold from `slow_secs` and `slow_secs_by_label`.
    pub fn slowness(&self) -> Result<SlownessThreshold, ConfigError> {
        self.slow_secs_by_label.iter().try_fold(
            SlownessThreshold::from_secs(self.slow_secs)?,
            |threshold, (label, secs)| threshold.with_label_secs(label, *secs),
        )
    }
}
