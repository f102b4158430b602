//! Snapshots a source folder into a run directory.

use std::fs;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use mlw_core::errors::{ErrorInfo, MlwError};
use walkdir::WalkDir;

/// Per-folder file listing extra glob patterns to leave out of snapshots.
pub const IGNORE_FILE: &str = ".mlwignore";

const ALWAYS_EXCLUDED: &[&str] = &["outputs", "outputs/**", "logs", "logs/**"];

/// Copies `source` into `target`, skipping previous outputs, logs and any
/// pattern listed in `.mlwignore`. Returns the number of files copied.
pub fn snapshot(source: &Path, target: &Path) -> Result<usize, MlwError> {
    let excluded = exclusion_set(source)?;
    fs::create_dir_all(target).map_err(|err| MlwError::io("package.mkdir", target, err))?;
    let mut copied = 0;
    let walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(source) {
            Ok(relative) => !excluded.is_match(relative),
            Err(_) => false,
        });
    for entry in walker {
        let entry = entry.map_err(|err| {
            MlwError::Storage(
                ErrorInfo::new("package.walk", err.to_string())
                    .with_context("source", source.display().to_string()),
            )
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|err| MlwError::io("package.mkdir", &destination, err))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &destination)
                .map_err(|err| MlwError::io("package.copy", &destination, err))?;
            copied += 1;
        }
    }
    log::debug!(
        "snapshot {} -> {} ({copied} file(s))",
        source.display(),
        target.display()
    );
    Ok(copied)
}

fn exclusion_set(source: &Path) -> Result<GlobSet, MlwError> {
    let mut patterns: Vec<String> = ALWAYS_EXCLUDED.iter().map(|p| p.to_string()).collect();
    let ignore_path = source.join(IGNORE_FILE);
    if ignore_path.is_file() {
        let text = fs::read_to_string(&ignore_path)
            .map_err(|err| MlwError::io("package.ignore_read", &ignore_path, err))?;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.trim_end_matches('/');
            patterns.push(line.to_string());
            patterns.push(format!("{line}/**"));
        }
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in &patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            MlwError::Validation(
                ErrorInfo::new("package.ignore_pattern", err.to_string())
                    .with_context("pattern", pattern.clone())
                    .with_context("path", ignore_path.display().to_string()),
            )
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|err| {
        MlwError::Validation(ErrorInfo::new("package.ignore_pattern", err.to_string()))
    })
}
