use std::fs;
use std::path::Path;

use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::to_canonical_json_bytes;

use crate::model::RegisteredModel;

fn export_error(path: &Path, err: impl ToString) -> MlwError {
    MlwError::Storage(
        ErrorInfo::new("registry.export", err.to_string())
            .with_context("path", path.display().to_string()),
    )
}

pub fn export_json(models: &[RegisteredModel], out_path: &Path) -> Result<(), MlwError> {
    let bytes = to_canonical_json_bytes(&models)?;
    fs::write(out_path, bytes).map_err(|err| export_error(out_path, err))
}

/// One row per version; tags and properties as canonical JSON objects.
pub fn export_csv(models: &[RegisteredModel], out_path: &Path) -> Result<(), MlwError> {
    let mut wtr = csv::Writer::from_path(out_path).map_err(|err| export_error(out_path, err))?;
    wtr.write_record([
        "name",
        "version",
        "run_id",
        "experiment",
        "source_path",
        "sha256",
        "tags",
        "properties",
        "created_at",
    ])
    .map_err(|err| export_error(out_path, err))?;
    for model in models {
        wtr.write_record([
            model.name.clone(),
            model.version.to_string(),
            model.run_id.clone(),
            model.experiment.clone(),
            model.source_path.clone(),
            model.sha256.clone(),
            mlw_core::to_canonical_json_string(&model.tags)?,
            mlw_core::to_canonical_json_string(&model.properties)?,
            model.created_at.clone(),
        ])
        .map_err(|err| export_error(out_path, err))?;
    }
    wtr.flush().map_err(|err| export_error(out_path, err))
}
