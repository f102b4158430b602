//! Structured error types shared across mlw crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`MlwError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, names, identifiers).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for the toolkit.
///
/// Training script failures are not represented here: they end up as a
/// `Failed` run status that the caller inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum MlwError {
    /// Missing or invalid workspace configuration, expired credentials.
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// Malformed job spec, missing folder or entry script, bad names.
    #[error("validation error: {0}")]
    Validation(ErrorInfo),
    /// The execution backend could not accept the run.
    #[error("execution error: {0}")]
    Execution(ErrorInfo),
    /// Registration requested for an artifact the run did not produce.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(ErrorInfo),
    /// Filesystem or database failures.
    #[error("storage error: {0}")]
    Storage(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl MlwError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            MlwError::Configuration(info)
            | MlwError::Validation(info)
            | MlwError::Execution(info)
            | MlwError::ArtifactNotFound(info)
            | MlwError::Storage(info)
            | MlwError::Serde(info) => info,
        }
    }

    /// Shorthand for a validation error without context.
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        MlwError::Validation(ErrorInfo::new(code, message))
    }

    /// Wraps an I/O failure on `path` into a storage error.
    pub fn io(code: impl Into<String>, path: &std::path::Path, err: std::io::Error) -> Self {
        MlwError::Storage(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
