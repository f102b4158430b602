use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::metrics::MetricLog;
use mlw_core::names::validate_resource_name;
use mlw_core::params::validate_params;
use mlw_core::stable_hash_string;
use mlw_workspace::Workspace;

use crate::backend::{ExecutionBackend, InlineBackend, LaunchRequest, ProcessBackend};
use crate::package;
use crate::routine::RoutineRegistry;
use crate::run::{Run, RunOutcome, RunRecord, RunStatus, RECORD_FILE, SNAPSHOT_DIR};
use crate::spec::{ComputeTarget, TrainingJobSpec};

static SUBMISSIONS: AtomicU64 = AtomicU64::new(0);

/// Submits training jobs against a workspace and reloads past runs.
pub struct Runner {
    workspace: Workspace,
    backends: BTreeMap<ComputeTarget, Arc<dyn ExecutionBackend>>,
}

impl Runner {
    /// Runner with the `local` process backend and an inline backend that
    /// knows no routines.
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            backends: BTreeMap::new(),
        }
        .with_backend(Arc::new(ProcessBackend::new()))
        .with_backend(Arc::new(InlineBackend::default()))
    }

    /// Makes `routines` available to the `inline` target.
    pub fn with_routines(self, routines: RoutineRegistry) -> Self {
        self.with_backend(Arc::new(InlineBackend::new(routines)))
    }

    /// Installs `backend` for its target, replacing any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.backends.insert(backend.target(), backend);
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Validates and packages `spec`, hands it to the compute target and
    /// returns the run without waiting for it.
    pub fn submit(&self, spec: &TrainingJobSpec, experiment: &str) -> Result<Run, MlwError> {
        validate_resource_name("experiment", experiment)?;
        let target = spec.validate()?;
        let environment = spec.environment.resolve()?;
        let backend = self.backends.get(&target).ok_or_else(|| {
            MlwError::Execution(
                ErrorInfo::new("runner.no_backend", "no backend installed for compute target")
                    .with_context("target", target.as_str()),
            )
        })?;
        let parameters = backend.prepare(spec)?;
        validate_params(&parameters)?;

        let run_id = next_run_id(experiment, spec)?;
        let dir = self.workspace.runs_dir().join(experiment).join(&run_id);
        let snapshot_dir = dir.join(SNAPSHOT_DIR);
        package::snapshot(&spec.source_dir, &snapshot_dir)?;

        let record = RunRecord {
            id: run_id.clone(),
            experiment: experiment.to_string(),
            status: RunStatus::Queued,
            entry_script: spec.entry_script.clone(),
            compute_target: target,
            parameters: parameters.clone(),
            environment: environment.clone(),
            submitted_at: Utc::now().to_rfc3339(),
            started_at: None,
            finished_at: None,
            metrics: MetricLog::new(),
            output_files: Vec::new(),
            error: None,
            exit_code: None,
        };
        let (run, handle) = Run::create(&dir, record)?;
        log::info!(
            "submitted run {run_id} to {target} (experiment {experiment}, environment {})",
            environment.name
        );

        let request = LaunchRequest {
            run_id,
            experiment: experiment.to_string(),
            entry_script: spec.entry_script.clone(),
            parameters,
            environment,
            snapshot_dir,
        };
        if let Err(err) = backend.launch(request, handle.clone()) {
            let _ = handle.finish(RunOutcome::Failed {
                error: err.to_string(),
                exit_code: None,
            });
            return Err(err);
        }
        Ok(run)
    }

    /// Reloads a run by id.
    pub fn get_run(&self, run_id: &str) -> Result<Run, MlwError> {
        let experiment = run_id
            .rsplitn(3, '_')
            .nth(2)
            .filter(|experiment| validate_resource_name("experiment", experiment).is_ok());
        let dir = experiment.map(|experiment| self.workspace.runs_dir().join(experiment).join(run_id));
        match dir {
            Some(dir) if dir.join(RECORD_FILE).is_file() => Run::load(&dir),
            _ => Err(MlwError::Validation(
                ErrorInfo::new("runner.unknown_run", "no run with this id")
                    .with_context("run", run_id),
            )),
        }
    }

    /// Experiments that have at least one run directory.
    pub fn experiments(&self) -> Result<Vec<String>, MlwError> {
        let mut names: Vec<String> = subdirs(&self.workspace.runs_dir())?
            .into_iter()
            .filter_map(|dir| dir.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Runs of one experiment, or of all experiments, in submission order.
    /// Run directories whose record cannot be read are skipped.
    pub fn list_runs(&self, experiment: Option<&str>) -> Result<Vec<Run>, MlwError> {
        let experiments = match experiment {
            Some(name) => vec![name.to_string()],
            None => self.experiments()?,
        };
        let mut runs = Vec::new();
        for name in experiments {
            for dir in subdirs(&self.workspace.runs_dir().join(&name))? {
                if !dir.join(RECORD_FILE).is_file() {
                    continue;
                }
                match Run::load(&dir) {
                    Ok(run) => runs.push(run),
                    Err(err) => log::warn!("skipping unreadable run {}: {err}", dir.display()),
                }
            }
        }
        runs.sort_by_cached_key(|run| {
            let record = run.record();
            (record.submitted_at, record.id)
        });
        Ok(runs)
    }
}

fn subdirs(dir: &std::path::Path) -> Result<Vec<PathBuf>, MlwError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(MlwError::io("runner.list", dir, err)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| MlwError::io("runner.list", dir, err))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// `<experiment>_<unix seconds>_<8 hex chars>`.
fn next_run_id(experiment: &str, spec: &TrainingJobSpec) -> Result<String, MlwError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = SUBMISSIONS.fetch_add(1, Ordering::Relaxed);
    let digest = stable_hash_string(&(
        experiment,
        spec,
        now.as_nanos().to_string(),
        process::id(),
        counter,
    ))?;
    Ok(format!("{experiment}_{}_{}", now.as_secs(), &digest[..8]))
}
