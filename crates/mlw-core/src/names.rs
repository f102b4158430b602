use crate::errors::{ErrorInfo, MlwError};

const MAX_NAME_LEN: usize = 255;

/// Validates experiment and model names: 1..=255 characters drawn from
/// `[A-Za-z0-9_.-]`, not starting with a dot or dash.
pub fn validate_resource_name(kind: &str, name: &str) -> Result<(), MlwError> {
    let valid_chars = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'));
    let valid_start = name
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid_chars && valid_start && name.len() <= MAX_NAME_LEN {
        return Ok(());
    }
    Err(MlwError::Validation(
        ErrorInfo::new(
            format!("{kind}.invalid_name"),
            format!("{kind} names must be 1-{MAX_NAME_LEN} characters of [A-Za-z0-9_.-]"),
        )
        .with_context("name", name),
    ))
}
