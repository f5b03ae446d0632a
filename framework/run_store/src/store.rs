use crate::model::{EventRecord, RunDocument, RunMeta};
use crate::node::NodeIndicator;
use chrono::{DateTime, SubsecRound, Utc};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use ticket_probe_instruments::timestamp::{format_store_ts, seconds_between};
use ticket_probe_instruments::{Clocking, StepOutcome};

/// Folder that run documents are written to when the caller has no preference.
pub const DEFAULT_STORE_FOLDER: &str = "store";

const UNKNOWN: &str = "unknown";

/// How the scenario connected to the ticket system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Cloud,
    OnSite,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Cloud => write!(f, "cloud"),
            ConnectionMode::OnSite => write!(f, "on-site"),
        }
    }
}

/// What is known about a run when it starts.
///
/// Fields that are not set are recorded as `unknown`.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub scenario: String,
    pub identity: String,
    pub target: String,
    pub mode: String,
    pub project: String,
    pub start_time: DateTime<Utc>,
}

impl RunContext {
    pub fn new(identity: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            scenario: UNKNOWN.to_string(),
            identity: identity.into(),
            target: UNKNOWN.to_string(),
            mode: UNKNOWN.to_string(),
            project: UNKNOWN.to_string(),
            start_time,
        }
    }

    /// Set the `scenario` name
    pub fn scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    /// Set the `target` URL
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the connection `mode`
    pub fn mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode.to_string();
        self
    }

    /// Set the `project` key
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create store folder {}: {source}", path.display())]
    CreateFolder {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize run document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write run document {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Buffers the events of one run and persists them as a single document.
///
/// Events are only kept in memory until [RunStore::dump] writes the whole document at once.
/// `dump` is meant to be called exactly once at the end of the run. Calling it again rewrites the
/// file with refreshed end of run fields, but nothing should rely on that.
#[derive(Debug)]
pub struct RunStore {
    folder: PathBuf,
    document: RunDocument,
}

impl RunStore {
    /// Create the store for a run executed on this host.
    pub fn create(context: RunContext, folder: impl Into<PathBuf>) -> Self {
        Self::create_on_node(context, folder, NodeIndicator::detect())
    }

    /// Create the store for a run executed on the node identified by `node_indicator`.
    pub fn create_on_node(
        context: RunContext,
        folder: impl Into<PathBuf>,
        node_indicator: NodeIndicator,
    ) -> Self {
        let folder = folder.into();
        let start_time = context.start_time.trunc_subsecs(6);
        let db_name = format!(
            "{}-{}-{}.json",
            context.identity,
            format_store_ts(&start_time),
            node_indicator
        );
        let db_path = folder.join(&db_name).display().to_string();

        log::debug!(
            "Created run store {db_path} for scenario {} on probe {}",
            context.scenario,
            node_indicator.probe()
        );

        Self {
            folder,
            document: RunDocument {
                meta: RunMeta {
                    scenario: context.scenario,
                    identity: context.identity,
                    node_indicator: node_indicator.to_string(),
                    target: context.target,
                    mode: context.mode,
                    project: context.project,
                    db_name,
                    db_path,
                    start_ts: start_time,
                    total_secs: 0.0,
                    end_ts: None,
                    has_failures_declared: None,
                    has_failures_detected: None,
                },
                events: Vec::new(),
            },
        }
    }

    /// File name of the run document.
    pub fn db_name(&self) -> &str {
        &self.document.meta.db_name
    }

    /// Full path the run document is written to.
    pub fn path(&self) -> PathBuf {
        self.folder.join(self.db_name())
    }

    pub fn document(&self) -> &RunDocument {
        &self.document
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.document.events
    }

    /// Append an event and return its rank.
    ///
    /// The recorded duration is derived from the timestamps of the clocking, the duration it
    /// carries is only a hint.
    pub fn add(
        &mut self,
        label: impl Into<String>,
        ok: bool,
        clocking: Clocking,
        comment: impl Into<String>,
    ) -> usize {
        let rank = self.document.events.len() + 1;
        let label = label.into();
        let duration_usecs = clocking.measured_usecs();
        if duration_usecs != clocking.duration_usecs {
            log::debug!(
                "Step {rank} {label} reported {}us but its timestamps span {duration_usecs}us",
                clocking.duration_usecs
            );
        }

        self.document.events.push(EventRecord {
            rank,
            label,
            ok,
            start_ts: clocking.start_ts,
            duration_usecs,
            end_ts: clocking.end_ts,
            comment: comment.into(),
        });

        rank
    }

    /// Append the outcome of a timed operation and return its rank.
    pub fn record(&mut self, outcome: StepOutcome, comment: impl Into<String>) -> usize {
        self.add(outcome.label, outcome.ok, outcome.clocking, comment)
    }

    /// Finalize the run and write its document.
    ///
    /// The document is written to a temporary file next to the destination which is then moved
    /// into place, so readers see either no document or the complete one.
    pub fn dump(&mut self, end_time: DateTime<Utc>, has_failures: bool) -> Result<PathBuf, StoreError> {
        let end_time = end_time.trunc_subsecs(6);
        let has_failures_detected = self.document.detect_failures();

        let meta = &mut self.document.meta;
        meta.end_ts = Some(end_time);
        meta.total_secs = seconds_between(&meta.start_ts, &end_time);
        meta.has_failures_declared = Some(has_failures);
        meta.has_failures_detected = Some(has_failures_detected);

        let path = self.path();
        std::fs::create_dir_all(&self.folder).map_err(|source| StoreError::CreateFolder {
            path: self.folder.clone(),
            source,
        })?;

        let payload = serde_json::to_vec(&self.document)?;
        write_in_place(&self.folder, &path, &payload)
            .map_err(|source| StoreError::Write { path: path.clone(), source })?;

        log::info!(
            "Stored {} events of run {} in {}",
            self.document.events.len(),
            self.document.meta.identity,
            path.display()
        );

        Ok(path)
    }
}

fn write_in_place(folder: &Path, path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(folder)?;
    file.write_all(payload)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
