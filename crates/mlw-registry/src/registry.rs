use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::names::validate_resource_name;
use mlw_core::sha256_hex;
use mlw_exp::{Run, RunStatus};
use mlw_workspace::Workspace;
use rusqlite::{Connection, TransactionBehavior};

use crate::model::{Metadata, RegisteredModel};
use crate::schema::{
    db_error, delete_model, init_schema, insert_model, load_model, load_models, load_versions,
    reserve_version,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Versioned store of model artifacts produced by completed runs.
///
/// Version numbers come from a per-name counter updated inside an
/// `IMMEDIATE` transaction, so registrations from several threads or
/// processes never share a version, and deleted versions are not reused.
#[derive(Debug)]
pub struct ModelRegistry {
    conn: Mutex<Connection>,
    models_dir: PathBuf,
}

impl ModelRegistry {
    pub fn open(workspace: &Workspace) -> Result<Self, MlwError> {
        Self::open_at(&workspace.registry_path(), &workspace.models_dir())
    }

    pub fn open_at(db_path: &Path, models_dir: &Path) -> Result<Self, MlwError> {
        let mut conn = Connection::open(db_path).map_err(|err| {
            MlwError::Storage(
                ErrorInfo::new("registry.open", err.to_string())
                    .with_context("path", db_path.display().to_string()),
            )
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| db_error("registry.open", err))?;
        init_schema(&mut conn)?;
        fs::create_dir_all(models_dir)
            .map_err(|err| MlwError::io("registry.models_dir", models_dir, err))?;
        Ok(Self {
            conn: Mutex::new(conn),
            models_dir: models_dir.to_path_buf(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `artifact` (a path from `run.output_files()`) as the next
    /// version of `name`.
    ///
    /// Fails with `ArtifactNotFound` and records nothing unless the run
    /// completed and produced the artifact.
    pub fn register(
        &self,
        run: &Run,
        artifact: &str,
        name: &str,
        tags: &Metadata,
        properties: &Metadata,
    ) -> Result<RegisteredModel, MlwError> {
        validate_resource_name("model", name)?;
        let record = run.record();
        if record.status != RunStatus::Completed {
            return Err(MlwError::ArtifactNotFound(
                ErrorInfo::new("registry.run_not_completed", "run has not completed")
                    .with_context("run", record.id.clone())
                    .with_context("status", record.status.as_str())
                    .with_hint("wait for the run before registering its outputs"),
            ));
        }
        let artifact = normalize(artifact);
        let source = run.output_path(&artifact);
        if !record.output_files.contains(&artifact) || !source.is_file() {
            return Err(MlwError::ArtifactNotFound(
                ErrorInfo::new("registry.artifact_missing", "run did not produce this artifact")
                    .with_context("run", record.id.clone())
                    .with_context("artifact", artifact)
                    .with_hint(format!("outputs: {}", record.output_files.join(", "))),
            ));
        }
        let bytes = fs::read(&source).map_err(|err| MlwError::io("registry.read", &source, err))?;
        let file_name = source
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "artifact".into());

        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error("registry.begin", err))?;
        let version = reserve_version(&tx, name)?;
        let version_dir = self.models_dir.join(name).join(version.to_string());
        let stored_path = version_dir.join(file_name);
        let model = RegisteredModel {
            name: name.to_string(),
            version,
            run_id: record.id.clone(),
            experiment: record.experiment.clone(),
            source_path: artifact,
            stored_path: stored_path.clone(),
            sha256: sha256_hex(&bytes),
            tags: tags.clone(),
            properties: properties.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        let stored = fs::create_dir_all(&version_dir)
            .and_then(|()| fs::write(&stored_path, &bytes))
            .map_err(|err| MlwError::io("registry.store", &stored_path, err));
        let committed = stored
            .and_then(|()| insert_model(&tx, &model))
            .and_then(|()| tx.commit().map_err(|err| db_error("registry.commit", err)));
        if let Err(err) = committed {
            let _ = fs::remove_dir_all(&version_dir);
            return Err(err);
        }
        log::info!(
            "registered {} version {} from run {}",
            model.name,
            model.version,
            model.run_id
        );
        Ok(model)
    }

    /// Every version of every model, ordered by name then version.
    pub fn list(&self) -> Result<Vec<RegisteredModel>, MlwError> {
        load_models(&self.lock())
    }

    pub fn versions(&self, name: &str) -> Result<Vec<RegisteredModel>, MlwError> {
        load_versions(&self.lock(), name)
    }

    pub fn get(&self, name: &str, version: u32) -> Result<RegisteredModel, MlwError> {
        load_model(&self.lock(), name, version)?.ok_or_else(|| not_registered(name, version))
    }

    /// Highest registered version of `name`.
    pub fn latest(&self, name: &str) -> Result<RegisteredModel, MlwError> {
        load_versions(&self.lock(), name)?.pop().ok_or_else(|| {
            MlwError::ArtifactNotFound(
                ErrorInfo::new("registry.model_not_found", "no versions registered")
                    .with_context("model", name),
            )
        })
    }

    /// Removes one version and its stored artifact. The version number
    /// stays consumed.
    pub fn delete(&self, name: &str, version: u32) -> Result<RegisteredModel, MlwError> {
        let conn = self.lock();
        let model = load_model(&conn, name, version)?.ok_or_else(|| not_registered(name, version))?;
        delete_model(&conn, name, version)?;
        drop(conn);
        let version_dir = self.models_dir.join(name).join(version.to_string());
        if let Err(err) = fs::remove_dir_all(&version_dir) {
            log::warn!("could not remove {}: {err}", version_dir.display());
        }
        log::info!("deleted {name} version {version}");
        Ok(model)
    }
}

fn not_registered(name: &str, version: u32) -> MlwError {
    MlwError::ArtifactNotFound(
        ErrorInfo::new("registry.model_not_found", "model version is not registered")
            .with_context("model", name)
            .with_context("version", version.to_string()),
    )
}

fn normalize(artifact: &str) -> String {
    let artifact = artifact.replace('\\', "/");
    artifact.trim_start_matches("./").to_string()
}
