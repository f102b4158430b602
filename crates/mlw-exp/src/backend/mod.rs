//! Compute targets a run can be submitted to.

mod inline;
mod process;

use std::path::PathBuf;

use mlw_core::errors::MlwError;
use mlw_core::params::ParamMap;

use crate::environment::ResolvedEnvironment;
use crate::run::RunHandle;
use crate::spec::{ComputeTarget, TrainingJobSpec};

pub use inline::InlineBackend;
pub use process::{ProcessBackend, METRIC_PREFIX};

/// Everything a backend needs to start a packaged run.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub run_id: String,
    pub experiment: String,
    pub entry_script: String,
    /// Effective parameters, as returned by [`ExecutionBackend::prepare`].
    pub parameters: ParamMap,
    pub environment: ResolvedEnvironment,
    pub snapshot_dir: PathBuf,
}

pub trait ExecutionBackend: Send + Sync {
    fn target(&self) -> ComputeTarget;

    /// Checks a spec before anything is written and returns the effective
    /// parameters for the run.
    fn prepare(&self, spec: &TrainingJobSpec) -> Result<ParamMap, MlwError>;

    /// Starts the run and returns without waiting for it. Failures of the
    /// training code itself are reported through `handle`, not as errors.
    fn launch(&self, request: LaunchRequest, handle: RunHandle) -> Result<(), MlwError>;
}
