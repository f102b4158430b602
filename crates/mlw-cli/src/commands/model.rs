use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand, ValueEnum};
use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_registry::{export_csv, export_json, Metadata, ModelRegistry, RegisteredModel};

use super::{load_workspace, runner};

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Register an output file of a completed run as a new model version.
    Register(RegisterArgs),
    /// List every registered version.
    List(ListArgs),
    /// Delete one version; its number is not reused.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(long)]
    pub run: String,
    /// Artifact path relative to the run, e.g. `outputs/diabetes_model.bin`.
    #[arg(long, default_value = mlw_train::MODEL_ARTIFACT)]
    pub artifact: String,
    #[arg(long)]
    pub name: String,
    /// Tag as `key=value`, repeatable.
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,
    /// Property as `key=value`, repeatable.
    #[arg(long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
    /// Copy the run's latest value of this metric into the properties.
    #[arg(long = "metric-property", value_name = "METRIC")]
    pub metric_properties: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ListFormat {
    Text,
    Json,
    Csv,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only versions of this model.
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, value_enum, default_value = "text")]
    pub format: ListFormat,
    /// Output file for `json` and `csv`.
    #[arg(long, required_if_eq_any = [("format", "json"), ("format", "csv")])]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub version: u32,
}

fn parse_pairs(raw: &[String], kind: &str) -> Result<Metadata, MlwError> {
    let mut pairs = Metadata::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(MlwError::Validation(
                ErrorInfo::new(format!("cli.{kind}"), "expected key=value")
                    .with_context("input", entry.clone()),
            ));
        };
        pairs.insert(key.trim().to_string(), value.to_string());
    }
    Ok(pairs)
}

fn print_models(models: &[RegisteredModel]) {
    for model in models {
        println!("{model}");
        println!();
    }
}

pub fn run(cmd: &ModelCommand, config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let workspace = load_workspace(config)?;
    let registry = ModelRegistry::open(&workspace)?;
    match cmd {
        ModelCommand::Register(args) => {
            let run = runner(workspace).get_run(&args.run)?;
            let tags = parse_pairs(&args.tags, "tag")?;
            let mut properties = parse_pairs(&args.properties, "property")?;
            for metric in &args.metric_properties {
                let value = run.metric(metric).ok_or_else(|| {
                    MlwError::Validation(
                        ErrorInfo::new("cli.metric_property", "run did not log this metric")
                            .with_context("metric", metric.clone())
                            .with_context("run", args.run.clone()),
                    )
                })?;
                properties.insert(metric.clone(), value.to_string());
            }
            let model = registry.register(&run, &args.artifact, &args.name, &tags, &properties)?;
            println!("{model}");
        }
        ModelCommand::List(args) => {
            let models = match &args.name {
                Some(name) => registry.versions(name)?,
                None => registry.list()?,
            };
            match (args.format, &args.out) {
                (ListFormat::Json, Some(out)) => export_json(&models, out)?,
                (ListFormat::Csv, Some(out)) => export_csv(&models, out)?,
                _ => print_models(&models),
            }
        }
        ModelCommand::Delete(args) => {
            let removed = registry.delete(&args.name, args.version)?;
            println!("deleted {} version {}", removed.name, removed.version);
        }
    }
    Ok(())
}
