//! Run state shared between the caller (`Run`) and the executing backend
//! (`RunHandle`), persisted as `run.json` plus `logs.txt`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::metrics::{latest, MetricLog, MetricValue, RunLogger};
use mlw_core::params::ParamMap;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::environment::ResolvedEnvironment;
use crate::spec::ComputeTarget;

pub const RECORD_FILE: &str = "run.json";
pub const LOG_FILE: &str = "logs.txt";
pub const SNAPSHOT_DIR: &str = "snapshot";
pub const OUTPUTS_DIR: &str = "outputs";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized form of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub experiment: String,
    pub status: RunStatus,
    pub entry_script: String,
    pub compute_target: ComputeTarget,
    #[serde(default)]
    pub parameters: ParamMap,
    pub environment: ResolvedEnvironment,
    pub submitted_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub metrics: MetricLog,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { exit_code: Option<i32> },
    Failed { error: String, exit_code: Option<i32> },
}

#[derive(Debug)]
struct RunState {
    record: RunRecord,
    log: Vec<String>,
}

#[derive(Debug)]
struct RunShared {
    dir: PathBuf,
    state: Mutex<RunState>,
    changed: Condvar,
    /// False for runs reloaded from disk; those are refreshed by polling.
    attached: bool,
}

impl RunShared {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Caller-side view of a submitted run.
#[derive(Debug, Clone)]
pub struct Run {
    shared: Arc<RunShared>,
}

impl Run {
    /// Persists a freshly queued run and returns the caller and backend halves.
    pub(crate) fn create(dir: &Path, record: RunRecord) -> Result<(Run, RunHandle), MlwError> {
        fs::create_dir_all(dir).map_err(|err| MlwError::io("run.mkdir", dir, err))?;
        write_record(dir, &record)?;
        let shared = Arc::new(RunShared {
            dir: dir.to_path_buf(),
            state: Mutex::new(RunState {
                record,
                log: Vec::new(),
            }),
            changed: Condvar::new(),
            attached: true,
        });
        Ok((
            Run {
                shared: Arc::clone(&shared),
            },
            RunHandle { shared },
        ))
    }

    /// Reloads a run from its directory.
    pub fn load(dir: &Path) -> Result<Run, MlwError> {
        let record = read_record(dir)?;
        let log = read_log(dir)?;
        Ok(Run {
            shared: Arc::new(RunShared {
                dir: dir.to_path_buf(),
                state: Mutex::new(RunState { record, log }),
                changed: Condvar::new(),
                attached: false,
            }),
        })
    }

    pub fn id(&self) -> String {
        self.shared.lock().record.id.clone()
    }

    pub fn experiment(&self) -> String {
        self.shared.lock().record.experiment.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.shared.lock().record.status
    }

    /// Snapshot of the full record. Metrics are partial until the run is
    /// terminal.
    pub fn record(&self) -> RunRecord {
        self.shared.lock().record.clone()
    }

    pub fn metrics(&self) -> MetricLog {
        self.shared.lock().record.metrics.clone()
    }

    /// Latest value logged under `name`.
    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        latest(&self.shared.lock().record.metrics, name).cloned()
    }

    pub fn output_files(&self) -> Vec<String> {
        self.shared.lock().record.output_files.clone()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.shared.lock().log.clone()
    }

    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Copy of the source folder the run executes in.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.shared.dir.join(SNAPSHOT_DIR)
    }

    /// Absolute location of an output file given its relative name.
    pub fn output_path(&self, relative: &str) -> PathBuf {
        self.snapshot_dir().join(relative)
    }

    /// Re-reads the persisted state. A no-op for runs executing in this
    /// process.
    pub fn refresh(&self) -> Result<(), MlwError> {
        if self.shared.attached {
            return Ok(());
        }
        let record = read_record(&self.shared.dir)?;
        let log = read_log(&self.shared.dir)?;
        let mut state = self.shared.lock();
        state.record = record;
        state.log = log;
        Ok(())
    }

    /// Blocks until the run is completed or failed, printing output lines
    /// to stdout when `show_output` is set. A failed run is not an error.
    pub fn wait_for_completion(&self, show_output: bool) -> Result<RunStatus, MlwError> {
        self.wait_with(|line| {
            if show_output {
                println!("{line}");
            }
        })
    }

    /// Blocks until a terminal status, passing every log line to `on_line`
    /// exactly once, in order.
    pub fn wait_with<F: FnMut(&str)>(&self, mut on_line: F) -> Result<RunStatus, MlwError> {
        let mut seen = 0;
        if self.shared.attached {
            let mut state = self.shared.lock();
            loop {
                for line in &state.log[seen..] {
                    on_line(line);
                }
                seen = state.log.len();
                if state.record.status.is_terminal() {
                    return Ok(state.record.status);
                }
                state = self
                    .shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        loop {
            self.refresh()?;
            let (status, fresh) = {
                let state = self.shared.lock();
                let fresh = state.log.get(seen..).map(<[String]>::to_vec).unwrap_or_default();
                (state.record.status, fresh)
            };
            seen += fresh.len();
            for line in &fresh {
                on_line(line);
            }
            if status.is_terminal() {
                return Ok(status);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Backend-side handle through which execution reports progress.
#[derive(Debug, Clone)]
pub struct RunHandle {
    shared: Arc<RunShared>,
}

impl RunHandle {
    pub fn id(&self) -> String {
        self.shared.lock().record.id.clone()
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.shared.dir.join(SNAPSHOT_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.snapshot_dir().join(OUTPUTS_DIR)
    }

    pub fn mark_running(&self) -> Result<(), MlwError> {
        let mut state = self.shared.lock();
        state.record.status = RunStatus::Running;
        state.record.started_at = Some(Utc::now().to_rfc3339());
        let result = write_record(&self.shared.dir, &state.record);
        drop(state);
        self.shared.changed.notify_all();
        log::info!("run {} running", self.id());
        result
    }

    /// Moves the run to its terminal status and records the output files.
    pub fn finish(&self, outcome: RunOutcome) -> Result<(), MlwError> {
        let outputs = collect_outputs(&self.snapshot_dir());
        let mut state = self.shared.lock();
        if state.record.status.is_terminal() {
            return Ok(());
        }
        let (status, error, exit_code) = match outcome {
            RunOutcome::Completed { exit_code } => (RunStatus::Completed, None, exit_code),
            RunOutcome::Failed { error, exit_code } => (RunStatus::Failed, Some(error), exit_code),
        };
        if let Some(message) = &error {
            log::warn!("run {} failed: {}", state.record.id, message);
        } else {
            log::info!("run {} completed", state.record.id);
        }
        state.record.status = status;
        state.record.error = error;
        state.record.exit_code = exit_code;
        state.record.finished_at = Some(Utc::now().to_rfc3339());
        state.record.output_files = outputs;
        let result = write_record(&self.shared.dir, &state.record);
        drop(state);
        self.shared.changed.notify_all();
        result
    }
}

impl RunLogger for RunHandle {
    fn log_metric(&self, name: &str, value: MetricValue) {
        let mut state = self.shared.lock();
        if state.record.status.is_terminal() {
            log::warn!(
                "ignoring metric {name} for finished run {}",
                state.record.id
            );
            return;
        }
        state
            .record
            .metrics
            .entry(name.to_string())
            .or_default()
            .push(value.storable());
        if let Err(err) = write_record(&self.shared.dir, &state.record) {
            log::warn!("could not persist metric {name}: {err}");
        }
        drop(state);
        self.shared.changed.notify_all();
    }

    fn log_line(&self, line: &str) {
        let mut state = self.shared.lock();
        state.log.push(line.to_string());
        if let Err(err) = append_log(&self.shared.dir, line) {
            log::warn!("could not append run log: {err}");
        }
        drop(state);
        self.shared.changed.notify_all();
    }
}

fn write_record(dir: &Path, record: &RunRecord) -> Result<(), MlwError> {
    let bytes = serde_json::to_vec_pretty(record).map_err(|err| {
        MlwError::Serde(
            ErrorInfo::new("run.serialize", err.to_string()).with_context("run", record.id.clone()),
        )
    })?;
    let tmp = dir.join(format!("{RECORD_FILE}.tmp"));
    let path = dir.join(RECORD_FILE);
    fs::write(&tmp, bytes).map_err(|err| MlwError::io("run.write", &tmp, err))?;
    fs::rename(&tmp, &path).map_err(|err| MlwError::io("run.write", &path, err))
}

fn read_record(dir: &Path) -> Result<RunRecord, MlwError> {
    let path = dir.join(RECORD_FILE);
    let bytes = fs::read(&path).map_err(|err| MlwError::io("run.read", &path, err))?;
    serde_json::from_slice(&bytes).map_err(|err| {
        MlwError::Serde(
            ErrorInfo::new("run.parse", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })
}

fn append_log(dir: &Path, line: &str) -> Result<(), MlwError> {
    let path = dir.join(LOG_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| MlwError::io("run.log", &path, err))?;
    writeln!(file, "{line}").map_err(|err| MlwError::io("run.log", &path, err))
}

fn read_log(dir: &Path) -> Result<Vec<String>, MlwError> {
    let path = dir.join(LOG_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(text.lines().map(str::to_string).collect()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(MlwError::io("run.log", &path, err)),
    }
}

/// Files under `<snapshot>/outputs`, as sorted `outputs/...` paths.
fn collect_outputs(snapshot: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(snapshot.join(OUTPUTS_DIR))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(snapshot).ok()?;
            let parts: Vec<_> = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            experiment: "unit".to_string(),
            status: RunStatus::Queued,
            entry_script: "train.sh".to_string(),
            compute_target: ComputeTarget::Local,
            parameters: ParamMap::new(),
            environment: ResolvedEnvironment {
                name: "generic".to_string(),
                interpreter: None,
                dependencies: Vec::new(),
            },
            submitted_at: Utc::now().to_rfc3339(),
            started_at: None,
            finished_at: None,
            metrics: MetricLog::new(),
            output_files: Vec::new(),
            error: None,
            exit_code: None,
        }
    }

    #[test]
    fn metrics_freeze_after_completion() {
        let dir = tempfile::tempdir().unwrap();
        let (run, handle) = Run::create(dir.path(), record("r1")).unwrap();
        handle.mark_running().unwrap();
        handle.log("Accuracy", 0.5);
        assert_eq!(run.metric("Accuracy"), Some(MetricValue::Number(0.5)));
        handle
            .finish(RunOutcome::Completed { exit_code: Some(0) })
            .unwrap();
        handle.log("Accuracy", 0.9);
        assert_eq!(run.metrics()["Accuracy"].len(), 1);
        assert_eq!(run.wait_for_completion(false).unwrap(), RunStatus::Completed);
    }

    #[test]
    fn outputs_are_relative_forward_slash_paths() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("outputs").join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("outputs").join("a.bin"), "a").unwrap();
        fs::write(dir.path().join("train.py"), "").unwrap();
        assert_eq!(
            collect_outputs(dir.path()),
            vec!["outputs/a.bin".to_string(), "outputs/nested/b.txt".to_string()]
        );
    }
}
