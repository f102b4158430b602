use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use mlw_core::errors::{ErrorInfo, MlwError};
use serde::Serialize;

use crate::config::{find_config, read_config, write_config, WorkspaceConfig, CONFIG_CANDIDATES};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MLW_CONFIG";

const STORAGE_DIR: &str = ".mlw";

/// Handle to a project and its local storage.
///
/// Built once from persisted configuration and passed explicitly to the
/// runner and the registry; it is never mutated after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    name: String,
    subscription_id: String,
    resource_group: String,
    region: String,
    root: PathBuf,
    config_path: PathBuf,
}

impl Workspace {
    /// Loads the workspace from `MLW_CONFIG`, or by searching upward from
    /// the current directory.
    pub fn load() -> Result<Self, MlwError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_config(Path::new(&path));
        }
        let cwd = env::current_dir().map_err(|err| {
            MlwError::Configuration(ErrorInfo::new("workspace.cwd", err.to_string()))
        })?;
        Self::discover(&cwd)
    }

    /// Searches `start` and its ancestors for a config file.
    pub fn discover(start: &Path) -> Result<Self, MlwError> {
        let path = find_config(start).ok_or_else(|| {
            MlwError::Configuration(
                ErrorInfo::new("workspace.not_found", "no workspace configuration found")
                    .with_context("start", start.display().to_string())
                    .with_context("candidates", CONFIG_CANDIDATES.join(","))
                    .with_hint("run `mlw workspace init` to create one"),
            )
        })?;
        Self::from_config(&path)
    }

    /// Loads the workspace described by the config file at `path`.
    pub fn from_config(path: &Path) -> Result<Self, MlwError> {
        let config = read_config(path)?;
        config.validate(Utc::now())?;
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let root = match &config.storage_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => config_dir.join(root),
            None if config_dir.file_name().is_some_and(|name| name == STORAGE_DIR) => {
                config_dir.clone()
            }
            None => config_dir.join(STORAGE_DIR),
        };
        let workspace = Self {
            name: config.workspace_name,
            subscription_id: config.subscription_id,
            resource_group: config.resource_group,
            region: config.region,
            root,
            config_path: path.to_path_buf(),
        };
        workspace.ensure_layout()?;
        log::info!(
            "loaded workspace {} ({}) from {}",
            workspace.name,
            workspace.region,
            path.display()
        );
        Ok(workspace)
    }

    /// Writes `config` into `dir` and loads the resulting workspace.
    pub fn create(dir: &Path, config: &WorkspaceConfig) -> Result<Self, MlwError> {
        config.validate(Utc::now())?;
        let path = write_config(dir, config)?;
        Self::from_config(&path)
    }

    fn ensure_layout(&self) -> Result<(), MlwError> {
        for dir in [self.root.clone(), self.runs_dir(), self.models_dir()] {
            fs::create_dir_all(&dir).map_err(|err| {
                MlwError::Configuration(
                    ErrorInfo::new("workspace.storage", err.to_string())
                        .with_context("path", dir.display().to_string()),
                )
            })?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Root of the local storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one subdirectory per experiment.
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    /// Directory holding registered model artifacts.
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    /// SQLite database backing the model registry.
    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.sqlite")
    }
}
