use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Free-form string metadata attached to a model version.
pub type Metadata = BTreeMap<String, String>;

/// One registered version of a named model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    pub version: u32,
    pub run_id: String,
    pub experiment: String,
    /// Artifact path relative to the run, e.g. `outputs/diabetes_model.bin`.
    pub source_path: String,
    /// Copy of the artifact inside the registry's model store.
    pub stored_path: PathBuf,
    pub sha256: String,
    #[serde(default)]
    pub tags: Metadata,
    #[serde(default)]
    pub properties: Metadata,
    pub created_at: String,
}

/// Renders `<name> version: <v>` followed by one `\t <key> : <value>` line
/// per tag, then per property.
impl fmt::Display for RegisteredModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} version: {}", self.name, self.version)?;
        for (key, value) in self.tags.iter().chain(self.properties.iter()) {
            write!(f, "\n\t {key} : {value}")?;
        }
        Ok(())
    }
}
