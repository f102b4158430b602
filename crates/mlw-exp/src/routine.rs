//! Training routines executed in-process by the `inline` target.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::metrics::RunLogger;
use mlw_core::params::{validate_params, ParamMap};
use serde::Deserialize;

/// What a routine sees while it runs.
pub struct RoutineContext {
    pub run_id: String,
    /// Snapshot directory; relative data paths resolve against it.
    pub working_dir: PathBuf,
    /// `<working_dir>/outputs`, created before the routine starts.
    pub output_dir: PathBuf,
    /// Parameters rendered as `--name value` arguments.
    pub args: Vec<String>,
    pub logger: Arc<dyn RunLogger>,
}

impl RoutineContext {
    /// Resolves `relative` against the working directory.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.working_dir.join(relative)
    }

    /// Emits one line of run output.
    pub fn print(&self, line: impl fmt::Display) {
        self.logger.log_line(&line.to_string());
    }
}

impl fmt::Debug for RoutineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutineContext")
            .field("run_id", &self.run_id)
            .field("working_dir", &self.working_dir)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A Rust training procedure that can be named by an inline manifest.
pub trait TrainingRoutine: Send + Sync {
    fn name(&self) -> &str;

    /// Runs to completion. An error marks the run failed.
    fn run(&self, ctx: &RoutineContext) -> Result<(), MlwError>;
}

/// Routines available to the inline backend, keyed by name.
#[derive(Clone, Default)]
pub struct RoutineRegistry {
    routines: BTreeMap<String, Arc<dyn TrainingRoutine>>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: TrainingRoutine + 'static>(&mut self, routine: R) -> &mut Self {
        self.routines
            .insert(routine.name().to_string(), Arc::new(routine));
        self
    }

    pub fn with<R: TrainingRoutine + 'static>(mut self, routine: R) -> Self {
        self.register(routine);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TrainingRoutine>> {
        self.routines.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.routines.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

impl fmt::Debug for RoutineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routines.keys()).finish()
    }
}

/// Inline entry script: which routine to run and its baked-in defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoutineManifest {
    pub routine: String,
    #[serde(default)]
    pub defaults: ParamMap,
}

impl RoutineManifest {
    /// Parses manifest text; `[defaults]` must hold valid parameter names
    /// and finite values.
    pub fn parse(text: &str) -> Result<Self, MlwError> {
        let manifest: Self = toml::from_str(text).map_err(|err| {
            MlwError::Validation(
                ErrorInfo::new("routine.manifest", "malformed routine manifest")
                    .with_context("reason", err.to_string())
                    .with_hint("expected `routine = \"<name>\"` and an optional [defaults] table"),
            )
        })?;
        validate_params(&manifest.defaults)?;
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> Result<Self, MlwError> {
        let text = fs::read_to_string(path).map_err(|err| {
            MlwError::Validation(
                ErrorInfo::new("routine.manifest", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::parse(&text)
    }

    /// Defaults overlaid with `overrides`.
    pub fn merged_parameters(&self, overrides: &ParamMap) -> ParamMap {
        let mut merged = self.defaults.clone();
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlw_core::params::ParamValue;

    #[test]
    fn manifest_defaults_are_overridden() {
        let manifest =
            RoutineManifest::parse("routine = \"toy\"\n[defaults]\nreg_rate = 0.01\nepochs = 5\n")
                .unwrap();
        assert_eq!(manifest.routine, "toy");
        let mut overrides = ParamMap::new();
        overrides.insert("reg_rate".into(), ParamValue::Float(0.1));
        let merged = manifest.merged_parameters(&overrides);
        assert_eq!(merged["reg_rate"], ParamValue::Float(0.1));
        assert_eq!(merged["epochs"], ParamValue::Int(5));
    }

    #[test]
    fn manifest_without_routine_is_rejected() {
        let err = RoutineManifest::parse("[defaults]\nx = 1\n").unwrap_err();
        assert_eq!(err.info().code, "routine.manifest");
    }

    #[test]
    fn manifest_defaults_must_render_as_flags() {
        for text in [
            "routine = \"toy\"\n[defaults]\n\"a b\" = 1\n",
            "routine = \"toy\"\n[defaults]\n\"--x\" = 1\n",
        ] {
            let err = RoutineManifest::parse(text).unwrap_err();
            assert_eq!(err.info().code, "params.invalid_name");
        }
        let err = RoutineManifest::parse("routine = \"toy\"\n[defaults]\nreg_rate = nan\n")
            .unwrap_err();
        assert_eq!(err.info().code, "params.non_finite");
    }
}
