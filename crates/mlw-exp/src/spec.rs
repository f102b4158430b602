use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::params::{validate_params, ParamMap, ParamValue};
use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentSpec;

/// Where a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeTarget {
    /// A subprocess on the caller's host, working directory = run snapshot.
    Local,
    /// A registered training routine on a thread of the calling process.
    Inline,
}

impl ComputeTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeTarget::Local => "local",
            ComputeTarget::Inline => "inline",
        }
    }
}

impl fmt::Display for ComputeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeTarget {
    type Err = MlwError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "local" => Ok(ComputeTarget::Local),
            "inline" => Ok(ComputeTarget::Inline),
            other => Err(MlwError::Validation(
                ErrorInfo::new("spec.compute_target", "unknown compute target")
                    .with_context("target", other)
                    .with_hint("use `local` or `inline`"),
            )),
        }
    }
}

/// Declarative description of a training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    pub source_dir: PathBuf,
    pub entry_script: String,
    #[serde(default = "default_target")]
    pub compute_target: String,
    #[serde(default)]
    pub environment: EnvironmentSpec,
    #[serde(default)]
    pub parameters: ParamMap,
}

fn default_target() -> String {
    ComputeTarget::Local.as_str().to_string()
}

impl TrainingJobSpec {
    pub fn new(source_dir: impl Into<PathBuf>, entry_script: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            entry_script: entry_script.into(),
            compute_target: default_target(),
            environment: EnvironmentSpec::default(),
            parameters: ParamMap::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.compute_target = target.into();
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentSpec) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Loads a job file (YAML, or JSON for `.json`). A relative `source_dir`
    /// is resolved against the job file's directory.
    pub fn from_file(path: &Path) -> Result<Self, MlwError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            MlwError::Validation(
                ErrorInfo::new("spec.read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let parsed: Result<Self, String> = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents).map_err(|err| err.to_string()),
            _ => serde_yaml::from_str(&contents).map_err(|err| err.to_string()),
        };
        let mut spec = parsed.map_err(|message| {
            MlwError::Validation(
                ErrorInfo::new("spec.parse", message)
                    .with_context("path", path.display().to_string()),
            )
        })?;
        if spec.source_dir.is_relative() {
            if let Some(base) = path.parent() {
                spec.source_dir = base.join(&spec.source_dir);
            }
        }
        Ok(spec)
    }

    pub fn target(&self) -> Result<ComputeTarget, MlwError> {
        self.compute_target.parse()
    }

    /// Path of the entry script inside the source folder.
    pub fn entry_path(&self) -> PathBuf {
        self.source_dir.join(&self.entry_script)
    }

    /// Checks the folder, the entry script, the parameters and the compute
    /// target; returns the parsed target.
    pub fn validate(&self) -> Result<ComputeTarget, MlwError> {
        if !self.source_dir.is_dir() {
            return Err(MlwError::Validation(
                ErrorInfo::new("spec.source_dir", "source folder does not exist")
                    .with_context("path", self.source_dir.display().to_string()),
            ));
        }
        let entry = Path::new(&self.entry_script);
        let contained = !self.entry_script.is_empty()
            && entry
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(MlwError::Validation(
                ErrorInfo::new(
                    "spec.entry_script",
                    "entry script must be a relative path inside the source folder",
                )
                .with_context("entry_script", self.entry_script.clone()),
            ));
        }
        if !self.entry_path().is_file() {
            return Err(MlwError::Validation(
                ErrorInfo::new("spec.entry_script", "entry script not found in source folder")
                    .with_context("entry_script", self.entry_script.clone())
                    .with_context("source_dir", self.source_dir.display().to_string()),
            ));
        }
        validate_params(&self.parameters)?;
        self.target()
    }
}
