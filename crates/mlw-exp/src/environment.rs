//! Execution environments: a generic environment with an explicit dependency
//! list, a framework preset, or a preset extended with extra dependencies.

use std::collections::BTreeMap;
use std::fmt;

use mlw_core::errors::{ErrorInfo, MlwError};
use serde::{Deserialize, Serialize};

/// Declarative environment request carried by a job spec.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Overrides the interpreter chosen by the preset or the script extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
}

/// Framework preset that already satisfies a family of training scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub interpreter: &'static str,
    pub dependencies: &'static [&'static str],
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "sklearn",
        interpreter: "python3",
        dependencies: &["scikit-learn", "pandas", "numpy", "joblib"],
    },
    Preset {
        name: "pytorch",
        interpreter: "python3",
        dependencies: &["torch", "numpy"],
    },
    Preset {
        name: "tensorflow",
        interpreter: "python3",
        dependencies: &["tensorflow", "numpy"],
    },
    Preset {
        name: "shell",
        interpreter: "sh",
        dependencies: &[],
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.name == name)
}

/// One dependency: normalised package name plus an optional version
/// constraint such as `==1.2` or `>=0.24`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Requirement {
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl Requirement {
    pub fn parse(raw: &str) -> Result<Self, MlwError> {
        let raw = raw.trim();
        let split = raw
            .find(|ch: char| matches!(ch, '=' | '<' | '>' | '!' | '~'))
            .unwrap_or(raw.len());
        let (package, constraint) = raw.split_at(split);
        let package = package.trim().to_ascii_lowercase().replace('_', "-");
        if package.is_empty() {
            return Err(MlwError::Validation(
                ErrorInfo::new("environment.requirement", "dependency has no package name")
                    .with_context("dependency", raw),
            ));
        }
        let constraint = constraint.trim();
        Ok(Self {
            package,
            constraint: (!constraint.is_empty()).then(|| constraint.replace(' ', "")),
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.package)?;
        if let Some(constraint) = &self.constraint {
            f.write_str(constraint)?;
        }
        Ok(())
    }
}

/// Environment after merging the preset with the manual dependency list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEnvironment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    pub dependencies: Vec<Requirement>,
}

impl EnvironmentSpec {
    pub fn preset(name: impl Into<String>) -> Self {
        Self {
            preset: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Merges preset and manual dependencies.
    ///
    /// The same package named twice is merged when the constraints agree or
    /// only one side pins a version; two different pins are rejected.
    pub fn resolve(&self) -> Result<ResolvedEnvironment, MlwError> {
        let preset = match &self.preset {
            Some(name) => Some(find_preset(name).ok_or_else(|| {
                let known: Vec<_> = PRESETS.iter().map(|preset| preset.name).collect();
                MlwError::Validation(
                    ErrorInfo::new("environment.unknown_preset", "unknown environment preset")
                        .with_context("preset", name.clone())
                        .with_hint(format!("known presets: {}", known.join(", "))),
                )
            })?),
            None => None,
        };

        let preset_deps = preset.map(|p| p.dependencies).unwrap_or_default();
        let mut merged: BTreeMap<String, Option<String>> = BTreeMap::new();
        let declared = preset_deps
            .iter()
            .copied()
            .chain(self.dependencies.iter().map(String::as_str));
        for raw in declared {
            let requirement = Requirement::parse(raw)?;
            let Some(existing) = merged.get_mut(&requirement.package) else {
                merged.insert(requirement.package, requirement.constraint);
                continue;
            };
            let Some(pin) = requirement.constraint else {
                continue;
            };
            match existing.as_deref() {
                None => {}
                Some(current) if current == pin => continue,
                Some(current) => {
                    return Err(MlwError::Validation(
                        ErrorInfo::new(
                            "environment.conflict",
                            "dependency is pinned to two different versions",
                        )
                        .with_context("package", requirement.package)
                        .with_context("first", current)
                        .with_context("second", pin),
                    ));
                }
            }
            *existing = Some(pin);
        }

        Ok(ResolvedEnvironment {
            name: preset.map_or("generic", |p| p.name).to_string(),
            interpreter: self
                .interpreter
                .clone()
                .or_else(|| preset.map(|p| p.interpreter.to_string())),
            dependencies: merged
                .into_iter()
                .map(|(package, constraint)| Requirement {
                    package,
                    constraint,
                })
                .collect(),
        })
    }
}
