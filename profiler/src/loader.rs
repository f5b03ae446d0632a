use crate::config::{LoadPolicy, TargetAliases};
use crate::target::target_key;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use ticket_probe_instruments::timestamp::{microseconds_between, seconds_between};
use ticket_probe_run_store::{load_run_document, probe_key, RunDocument, RunMeta};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Run in {} was never finalized, it has no end_ts", path.display())]
    Unfinished { path: PathBuf },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Walk { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::Unfinished { path } => path,
        }
    }
}

/// Loading stopped at a bad document under [LoadPolicy::FailFast].
#[derive(Debug, thiserror::Error)]
#[error("Loading stopped after {loaded} of {total} run documents: {source}")]
pub struct CorpusError {
    /// Documents loaded successfully before the failure
    pub loaded: usize,
    pub total: usize,
    pub source: LoadError,
}

/// One step of a loaded run, with offsets relative to the start of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEvent {
    pub rank: usize,
    pub label: String,
    pub ok: bool,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// Seconds from the start of the run to the start of the step
    pub start_rel: f64,
    /// Seconds from the start of the run to the end of the step
    pub end_rel: f64,
    /// Recomputed from the timestamps, the stored value is not used
    pub duration_usecs: i64,
    pub comment: String,
}

/// A finalized run, normalized for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRun {
    pub source: PathBuf,
    pub meta: RunMeta,
    pub target: String,
    pub probe: String,
    /// Neither the driver declared nor the store detected a failure
    pub ok: bool,
    pub end_ts: DateTime<Utc>,
    pub events: Vec<LoadedEvent>,
}

impl LoadedRun {
    pub fn from_document(
        source: PathBuf,
        document: RunDocument,
        aliases: &TargetAliases,
    ) -> Result<Self, LoadError> {
        let Some(end_ts) = document.meta.end_ts else {
            return Err(LoadError::Unfinished { path: source });
        };
        let meta = document.meta;
        let run_start = meta.start_ts;

        let events = document
            .events
            .into_iter()
            .map(|event| LoadedEvent {
                start_rel: seconds_between(&run_start, &event.start_ts),
                end_rel: seconds_between(&run_start, &event.end_ts),
                duration_usecs: microseconds_between(&event.start_ts, &event.end_ts),
                rank: event.rank,
                label: event.label,
                ok: event.ok,
                start_ts: event.start_ts,
                end_ts: event.end_ts,
                comment: event.comment,
            })
            .collect();

        Ok(Self {
            target: target_key(&meta.target, aliases),
            probe: probe_key(&meta.node_indicator).to_string(),
            ok: !(meta.has_failures_declared.unwrap_or(false)
                || meta.has_failures_detected.unwrap_or(false)),
            source,
            meta,
            end_ts,
            events,
        })
    }

    pub fn start_ts(&self) -> DateTime<Utc> {
        self.meta.start_ts
    }

    /// Microseconds spent inside measured steps.
    pub fn duty_usecs(&self) -> i64 {
        self.events.iter().map(|event| event.duration_usecs).sum()
    }
}

/// The runs of a batch, plus the documents that were left out.
#[derive(Debug, Default)]
pub struct Corpus {
    pub runs: Vec<LoadedRun>,
    /// Only ever filled under [LoadPolicy::SkipAndReport]
    pub skipped: Vec<LoadError>,
}

impl Corpus {
    /// Whether some documents were left out of the corpus.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn by_target(&self) -> BTreeMap<&str, Vec<&LoadedRun>> {
        self.runs
            .iter()
            .into_group_map_by(|run| run.target.as_str())
            .into_iter()
            .collect()
    }
}

/// Reads persisted run documents into a [Corpus].
#[derive(Debug, Default)]
pub struct RunCorpusLoader {
    pub policy: LoadPolicy,
    pub aliases: TargetAliases,
}

impl RunCorpusLoader {
    pub fn new(policy: LoadPolicy, aliases: TargetAliases) -> Self {
        Self { policy, aliases }
    }

    /// Load the documents at `paths`, in the given order.
    pub fn load<P>(&self, paths: &[P]) -> Result<Corpus, CorpusError>
    where
        P: AsRef<Path>,
    {
        let mut corpus = Corpus::default();
        for path in paths {
            match self.load_file(path.as_ref()) {
                Ok(run) => {
                    log::debug!(
                        "Loaded {} events of {} run on {} from {}",
                        run.events.len(),
                        run.meta.scenario,
                        run.target,
                        run.source.display()
                    );
                    corpus.runs.push(run);
                }
                Err(e) if self.policy == LoadPolicy::SkipAndReport => {
                    log::warn!("Skipping run document: {e}");
                    corpus.skipped.push(e);
                }
                Err(source) => {
                    return Err(CorpusError {
                        loaded: corpus.runs.len(),
                        total: paths.len(),
                        source,
                    })
                }
            }
        }

        log::info!(
            "Loaded {} of {} run documents",
            corpus.runs.len(),
            paths.len()
        );

        Ok(corpus)
    }

    /// Find the run documents at `inputs` and load them.
    ///
    /// Inputs that cannot be walked are load failures like any other: they stop the batch under
    /// [LoadPolicy::FailFast] and are reported as skipped otherwise.
    pub fn load_inputs(&self, inputs: &[PathBuf]) -> Result<Corpus, CorpusError> {
        let (paths, walk_errors) = collect_run_paths(inputs);
        if paths.is_empty() {
            log::warn!("No run documents found");
        }
        if self.policy == LoadPolicy::FailFast {
            if let Some(source) = walk_errors.into_iter().next() {
                return Err(CorpusError {
                    loaded: 0,
                    total: paths.len(),
                    source,
                });
            }
            return self.load(&paths);
        }

        for e in &walk_errors {
            log::warn!("Skipping input: {e}");
        }
        let mut corpus = self.load(&paths)?;
        corpus.skipped.extend(walk_errors);

        Ok(corpus)
    }

    pub fn load_file(&self, path: &Path) -> Result<LoadedRun, LoadError> {
        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = load_run_document(file).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        LoadedRun::from_document(path.to_path_buf(), document, &self.aliases)
    }
}

/// Expand the inputs into a sorted list of run document paths, plus the entries that could not
/// be walked.
///
/// Files given as inputs are taken as they are, folders are searched recursively for `.json`
/// files.
pub fn collect_run_paths(inputs: &[PathBuf]) -> (Vec<PathBuf>, Vec<LoadError>) {
    let mut paths = Vec::new();
    let mut errors = Vec::new();
    for input in inputs {
        for entry in walkdir::WalkDir::new(input) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    let path = source.path().unwrap_or(input.as_path()).to_path_buf();
                    errors.push(LoadError::Walk { path, source });
                    continue;
                }
            };
            let is_document = entry.depth() == 0
                || entry.path().extension().is_some_and(|ext| ext == "json");
            if !entry.file_type().is_dir() && is_document {
                paths.push(entry.into_path());
            }
        }
    }
    paths.sort();
    paths.dedup();

    (paths, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ticket_probe_run_store::EventRecord;

    fn at(usecs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 28, 14, 3, 22).unwrap() + chrono::Duration::microseconds(usecs)
    }

    fn document() -> RunDocument {
        RunDocument {
            meta: RunMeta {
                scenario: "single".to_string(),
                identity: "adhoc".to_string(),
                node_indicator: "7430eea0-7599-37db-b782-bbd336e7a755".to_string(),
                target: "https://jiraabcd.example.com".to_string(),
                mode: "on-site".to_string(),
                project: "PROJ".to_string(),
                db_name: String::new(),
                db_path: String::new(),
                start_ts: at(0),
                total_secs: 3.0,
                end_ts: Some(at(3_000_000)),
                has_failures_declared: Some(false),
                has_failures_detected: Some(false),
            },
            events: vec![EventRecord {
                rank: 1,
                label: "LOGIN".to_string(),
                ok: true,
                start_ts: at(250_000),
                // Not what the timestamps say
                duration_usecs: 7,
                end_ts: at(1_750_000),
                comment: String::new(),
            }],
        }
    }

    #[test]
    fn test_should_normalize_run() {
        let run =
            LoadedRun::from_document(PathBuf::from("a.json"), document(), &TargetAliases::default())
                .unwrap();
        assert_eq!(run.target, "prod");
        assert_eq!(run.probe, "7430eea0");
        assert!(run.ok);
        assert_eq!(run.end_ts, at(3_000_000));

        let event = &run.events[0];
        assert_eq!(event.duration_usecs, 1_500_000);
        assert_eq!(event.start_rel, 0.25);
        assert_eq!(event.end_rel, 1.75);
        assert_eq!(run.duty_usecs(), 1_500_000);
    }

    #[test]
    fn test_should_combine_declared_and_detected_failures() {
        for (declared, detected, ok) in [
            (Some(false), Some(false), true),
            (Some(true), Some(false), false),
            (Some(false), Some(true), false),
            (None, None, true),
        ] {
            let mut document = document();
            document.meta.has_failures_declared = declared;
            document.meta.has_failures_detected = detected;
            let run = LoadedRun::from_document(
                PathBuf::from("a.json"),
                document,
                &TargetAliases::default(),
            )
            .unwrap();
            assert_eq!(run.ok, ok, "declared {declared:?}, detected {detected:?}");
        }
    }

    #[test]
    fn test_should_group_runs_by_target() {
        let aliases = TargetAliases::default();
        let mut other = document();
        other.meta.target = "https://jira-test.example.com".to_string();
        let corpus = Corpus {
            runs: vec![
                LoadedRun::from_document(PathBuf::from("a.json"), document(), &aliases).unwrap(),
                LoadedRun::from_document(PathBuf::from("b.json"), other, &aliases).unwrap(),
                LoadedRun::from_document(PathBuf::from("c.json"), document(), &aliases).unwrap(),
            ],
            skipped: Vec::new(),
        };

        let by_target = corpus.by_target();
        assert_eq!(by_target.keys().copied().collect::<Vec<_>>(), vec!["prod", "test"]);
        assert_eq!(
            by_target["prod"]
                .iter()
                .map(|run| run.source.as_path())
                .collect::<Vec<_>>(),
            vec![Path::new("a.json"), Path::new("c.json")]
        );
        assert!(!corpus.is_partial());
    }

    #[test]
    fn test_should_collect_json_files_sorted() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested)?;
        for path in [
            dir.path().join("b.json"),
            nested.join("a.json"),
            dir.path().join("notes.txt"),
        ] {
            std::fs::write(path, "{}")?;
        }

        let (paths, errors) =
            collect_run_paths(&[dir.path().to_path_buf(), dir.path().join("b.json")]);
        assert_eq!(paths, vec![dir.path().join("b.json"), nested.join("a.json")]);
        assert!(errors.is_empty());

        // Files named directly are documents whatever their extension
        let (paths, _) = collect_run_paths(&[dir.path().join("notes.txt")]);
        assert_eq!(paths, vec![dir.path().join("notes.txt")]);

        Ok(())
    }

    #[test]
    fn test_should_skip_missing_input_when_skipping_invalid() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing");
        let run_path = dir.path().join("run.json");
        ticket_probe_run_store::store_run_document(&document(), std::fs::File::create(&run_path)?)?;
        let inputs = [missing.clone(), run_path.clone()];

        let corpus = RunCorpusLoader::new(LoadPolicy::SkipAndReport, TargetAliases::default())
            .load_inputs(&inputs)?;
        assert_eq!(corpus.runs.len(), 1);
        assert_eq!(corpus.runs[0].source, run_path);
        assert!(corpus.is_partial());
        assert_eq!(corpus.skipped.len(), 1);
        assert_eq!(corpus.skipped[0].path(), missing);
        assert!(matches!(corpus.skipped[0], LoadError::Walk { .. }));

        Ok(())
    }

    #[test]
    fn test_should_stop_at_missing_input_when_failing_fast() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing");
        let run_path = dir.path().join("run.json");
        ticket_probe_run_store::store_run_document(&document(), std::fs::File::create(&run_path)?)?;

        let err = RunCorpusLoader::default()
            .load_inputs(&[missing.clone(), run_path])
            .expect_err("A missing input must stop the batch");
        assert_eq!(err.loaded, 0);
        assert_eq!(err.total, 1);
        assert_eq!(err.source.path(), missing);
        assert!(matches!(err.source, LoadError::Walk { .. }));

        Ok(())
    }

    #[test]
    fn test_should_refuse_unfinished_run() {
        let mut document = document();
        document.meta.end_ts = None;
        let result =
            LoadedRun::from_document(PathBuf::from("a.json"), document, &TargetAliases::default());
        assert!(matches!(result, Err(LoadError::Unfinished { .. })));
    }
}
