//! Writes a training script and its input data into a self-contained folder.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use mlw_core::errors::{ErrorInfo, MlwError};

/// Training script text together with the file name it is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub file_name: String,
    pub text: String,
}

impl ScriptSource {
    pub fn new(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            text: text.into(),
        }
    }

    /// Reads a script from disk, keeping its file name.
    pub fn from_file(path: &Path) -> Result<Self, MlwError> {
        let file_name = plain_file_name(path)?;
        let text = fs::read_to_string(path).map_err(|err| {
            MlwError::Validation(
                ErrorInfo::new("materialize.script_read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Ok(Self { file_name, text })
    }
}

/// Folder produced by [`materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHandle {
    pub path: PathBuf,
    pub script_path: PathBuf,
    pub data_files: Vec<PathBuf>,
}

/// Creates `folder` if needed, copies each data file into it unmodified and
/// writes the script text verbatim.
///
/// Reusing an existing folder is not an error; running twice with the same
/// inputs leaves identical contents.
pub fn materialize(
    folder: &Path,
    script: &ScriptSource,
    data_files: &[PathBuf],
) -> Result<FolderHandle, MlwError> {
    check_script_name(&script.file_name)?;
    let mut seen = BTreeSet::from([script.file_name.clone()]);
    let mut targets = Vec::with_capacity(data_files.len());
    for source in data_files {
        if !source.is_file() {
            return Err(MlwError::Validation(
                ErrorInfo::new("materialize.data_missing", "data file does not exist")
                    .with_context("path", source.display().to_string()),
            ));
        }
        let name = plain_file_name(source)?;
        if !seen.insert(name.clone()) {
            return Err(MlwError::Validation(
                ErrorInfo::new(
                    "materialize.name_clash",
                    "two inputs would be written under the same name",
                )
                .with_context("name", name),
            ));
        }
        targets.push((source, folder.join(name)));
    }

    fs::create_dir_all(folder).map_err(|err| MlwError::io("materialize.mkdir", folder, err))?;
    let mut copied = Vec::with_capacity(targets.len());
    for (source, target) in targets {
        if !same_file(source, &target) {
            fs::copy(source, &target)
                .map_err(|err| MlwError::io("materialize.copy", &target, err))?;
        }
        copied.push(target);
    }
    let script_path = folder.join(&script.file_name);
    fs::write(&script_path, &script.text)
        .map_err(|err| MlwError::io("materialize.script_write", &script_path, err))?;
    log::debug!(
        "materialized {} with {} data file(s) into {}",
        script.file_name,
        copied.len(),
        folder.display()
    );
    Ok(FolderHandle {
        path: folder.to_path_buf(),
        script_path,
        data_files: copied,
    })
}

fn check_script_name(name: &str) -> Result<(), MlwError> {
    if Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name) {
        return Ok(());
    }
    Err(MlwError::Validation(
        ErrorInfo::new("materialize.script_name", "script name must be a plain file name")
            .with_context("name", name),
    ))
}

fn plain_file_name(path: &Path) -> Result<String, MlwError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            MlwError::Validation(
                ErrorInfo::new("materialize.file_name", "path has no usable file name")
                    .with_context("path", path.display().to_string()),
            )
        })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
