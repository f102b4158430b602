use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::metrics::RunLogger;
use mlw_core::params::{to_args, ParamMap};

use super::{ExecutionBackend, LaunchRequest};
use crate::routine::{RoutineContext, RoutineManifest, RoutineRegistry, TrainingRoutine};
use crate::run::{RunHandle, RunOutcome};
use crate::spec::{ComputeTarget, TrainingJobSpec};

/// Runs registered Rust routines on a thread of this process.
#[derive(Debug, Clone, Default)]
pub struct InlineBackend {
    routines: RoutineRegistry,
}

impl InlineBackend {
    pub fn new(routines: RoutineRegistry) -> Self {
        Self { routines }
    }

    pub fn routines(&self) -> &RoutineRegistry {
        &self.routines
    }

    fn resolve(&self, manifest: &RoutineManifest) -> Result<Arc<dyn TrainingRoutine>, MlwError> {
        self.routines.get(&manifest.routine).ok_or_else(|| {
            MlwError::Validation(
                ErrorInfo::new("routine.unknown", "no routine registered under this name")
                    .with_context("routine", manifest.routine.clone())
                    .with_hint(format!("registered: {}", self.routines.names().join(", "))),
            )
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "routine panicked".to_string()
    }
}

fn execute(routine: Arc<dyn TrainingRoutine>, request: LaunchRequest, handle: RunHandle) {
    if let Err(err) = handle.mark_running() {
        log::warn!("{err}");
    }
    let output_dir = handle.output_dir();
    let outcome = match fs::create_dir_all(&output_dir) {
        Err(err) => RunOutcome::Failed {
            error: format!("{}: {err}", output_dir.display()),
            exit_code: None,
        },
        Ok(()) => {
            let logger: Arc<dyn RunLogger> = Arc::new(handle.clone());
            let ctx = RoutineContext {
                run_id: request.run_id.clone(),
                working_dir: request.snapshot_dir.clone(),
                output_dir,
                args: to_args(&request.parameters),
                logger,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| routine.run(&ctx))) {
                Ok(Ok(())) => RunOutcome::Completed { exit_code: None },
                Ok(Err(err)) => {
                    handle.log_line(&err.to_string());
                    RunOutcome::Failed {
                        error: err.to_string(),
                        exit_code: None,
                    }
                }
                Err(payload) => RunOutcome::Failed {
                    error: format!("routine panicked: {}", panic_message(payload.as_ref())),
                    exit_code: None,
                },
            }
        }
    };
    if let Err(err) = handle.finish(outcome) {
        log::warn!("{err}");
    }
}

impl ExecutionBackend for InlineBackend {
    fn target(&self) -> ComputeTarget {
        ComputeTarget::Inline
    }

    fn prepare(&self, spec: &TrainingJobSpec) -> Result<ParamMap, MlwError> {
        let manifest = RoutineManifest::from_file(&spec.entry_path())?;
        self.resolve(&manifest)?;
        Ok(manifest.merged_parameters(&spec.parameters))
    }

    fn launch(&self, request: LaunchRequest, handle: RunHandle) -> Result<(), MlwError> {
        let manifest = RoutineManifest::from_file(&request.snapshot_dir.join(&request.entry_script))?;
        let routine = self.resolve(&manifest)?;
        let run_id = request.run_id.clone();
        thread::Builder::new()
            .name(format!("mlw-run-{run_id}"))
            .spawn(move || execute(routine, request, handle))
            .map(|_| ())
            .map_err(|err| {
                MlwError::Execution(
                    ErrorInfo::new("backend.spawn", err.to_string()).with_context("run", run_id),
                )
            })
    }
}
