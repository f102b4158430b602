//! Experiment side of mlw: materializing training folders, describing jobs,
//! running them on a compute target and tracking the resulting runs.

pub mod backend;
pub mod environment;
pub mod materialize;
pub mod package;
pub mod routine;
pub mod run;
pub mod runner;
pub mod spec;

pub use backend::{ExecutionBackend, InlineBackend, LaunchRequest, ProcessBackend, METRIC_PREFIX};
pub use environment::{EnvironmentSpec, Preset, Requirement, ResolvedEnvironment, PRESETS};
pub use materialize::{materialize, FolderHandle, ScriptSource};
pub use routine::{RoutineContext, RoutineManifest, RoutineRegistry, TrainingRoutine};
pub use run::{Run, RunHandle, RunOutcome, RunRecord, RunStatus};
pub use runner::Runner;
pub use spec::{ComputeTarget, TrainingJobSpec};
