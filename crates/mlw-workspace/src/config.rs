use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mlw_core::errors::{ErrorInfo, MlwError};
use serde::{Deserialize, Serialize};

/// File name written by [`write_config`].
pub const CONFIG_FILE_NAME: &str = "mlw.json";

/// Candidate locations probed in each directory during discovery, in order.
pub const CONFIG_CANDIDATES: [&str; 3] = ["mlw.json", ".mlw/config.json", "config.json"];

/// Persisted description of a workspace's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Local storage for runs and the model registry. Relative paths are
    /// resolved against the directory holding the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

fn default_region() -> String {
    "local".to_string()
}

/// Access token attached to a workspace config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    /// RFC 3339 expiry; tokens without one never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl WorkspaceConfig {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        workspace_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            workspace_name: workspace_name.into(),
            region: default_region(),
            storage_root: None,
            credentials: None,
        }
    }

    /// Checks required identity fields and credential expiry against `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), MlwError> {
        for (field, value) in [
            ("subscription_id", &self.subscription_id),
            ("resource_group", &self.resource_group),
            ("workspace_name", &self.workspace_name),
        ] {
            if value.trim().is_empty() {
                return Err(MlwError::Configuration(
                    ErrorInfo::new("workspace.missing_field", format!("{field} must not be empty"))
                        .with_context("field", field),
                ));
            }
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate(now)?;
        }
        Ok(())
    }
}

impl Credentials {
    fn validate(&self, now: DateTime<Utc>) -> Result<(), MlwError> {
        if self.token.trim().is_empty() {
            return Err(MlwError::Configuration(
                ErrorInfo::new("workspace.credentials_invalid", "credential token is empty")
                    .with_hint("re-authenticate and rewrite the workspace config"),
            ));
        }
        let Some(expires_at) = &self.expires_at else {
            return Ok(());
        };
        let expiry = DateTime::parse_from_rfc3339(expires_at).map_err(|err| {
            MlwError::Configuration(
                ErrorInfo::new("workspace.credentials_invalid", err.to_string())
                    .with_context("expires_at", expires_at.clone()),
            )
        })?;
        if expiry.with_timezone(&Utc) <= now {
            return Err(MlwError::Configuration(
                ErrorInfo::new("workspace.credentials_expired", "credentials have expired")
                    .with_context("expires_at", expires_at.clone())
                    .with_hint("re-authenticate and rewrite the workspace config"),
            ));
        }
        Ok(())
    }
}

/// Reads a config file, choosing TOML or JSON by extension.
pub fn read_config(path: &Path) -> Result<WorkspaceConfig, MlwError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        MlwError::Configuration(
            ErrorInfo::new("workspace.read_config", format!("failed to read config: {err}"))
                .with_context("path", path.display().to_string()),
        )
    })?;
    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&contents).map_err(|err| err.to_string()),
        _ => serde_json::from_str(&contents).map_err(|err| err.to_string()),
    };
    parsed.map_err(|message| {
        MlwError::Configuration(
            ErrorInfo::new("workspace.parse_config", message)
                .with_context("path", path.display().to_string()),
        )
    })
}

/// Persists `config` as `mlw.json` inside `dir` and returns the file path.
pub fn write_config(dir: &Path, config: &WorkspaceConfig) -> Result<PathBuf, MlwError> {
    fs::create_dir_all(dir).map_err(|err| MlwError::io("workspace.write_config", dir, err))?;
    let path = dir.join(CONFIG_FILE_NAME);
    let json = serde_json::to_string_pretty(config)
        .map_err(|err| MlwError::Serde(ErrorInfo::new("workspace.serialize", err.to_string())))?;
    fs::write(&path, json).map_err(|err| MlwError::io("workspace.write_config", &path, err))?;
    Ok(path)
}

/// Searches `start` and its ancestors for a config file.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())
    })
}
