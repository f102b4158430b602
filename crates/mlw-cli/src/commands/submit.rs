use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use mlw_core::parse_assignment;
use mlw_exp::{EnvironmentSpec, Run, RunStatus, TrainingJobSpec};

use super::{load_workspace, runner};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// YAML or JSON job file; flags below override its fields.
    #[arg(long)]
    pub spec: Option<PathBuf>,
    /// Source folder holding the entry script.
    #[arg(long, required_unless_present = "spec")]
    pub source_dir: Option<PathBuf>,
    /// Entry script, relative to the source folder.
    #[arg(long, required_unless_present = "spec")]
    pub entry: Option<String>,
    /// Compute target: `local` or `inline`.
    #[arg(long)]
    pub target: Option<String>,
    /// Environment preset, e.g. `sklearn`.
    #[arg(long)]
    pub preset: Option<String>,
    /// Extra dependency, repeatable (`pandas==2.1`).
    #[arg(long = "dependency", value_name = "REQ")]
    pub dependencies: Vec<String>,
    #[arg(long)]
    pub interpreter: Option<String>,
    /// Script parameter as `name=value`, repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,
    #[arg(long, default_value = "default")]
    pub experiment: String,
    /// Stream run output while waiting.
    #[arg(long)]
    pub show_output: bool,
}

fn build_spec(args: &SubmitArgs) -> Result<TrainingJobSpec, Box<dyn Error>> {
    let mut spec = match &args.spec {
        Some(path) => TrainingJobSpec::from_file(path)?,
        None => TrainingJobSpec::new(PathBuf::new(), String::new()),
    };
    if let Some(source_dir) = &args.source_dir {
        spec.source_dir = source_dir.clone();
    }
    if let Some(entry) = &args.entry {
        spec.entry_script = entry.clone();
    }
    if let Some(target) = &args.target {
        spec.compute_target = target.clone();
    }
    if args.preset.is_some() || args.interpreter.is_some() || !args.dependencies.is_empty() {
        let environment: &mut EnvironmentSpec = &mut spec.environment;
        if let Some(preset) = &args.preset {
            environment.preset = Some(preset.clone());
        }
        if let Some(interpreter) = &args.interpreter {
            environment.interpreter = Some(interpreter.clone());
        }
        environment.dependencies.extend(args.dependencies.iter().cloned());
    }
    for raw in &args.params {
        let (name, value) = parse_assignment(raw)?;
        spec.parameters.insert(name, value);
    }
    Ok(spec)
}

pub fn print_run(run: &Run) {
    let record = run.record();
    println!("run {} [{}] {}", record.id, record.experiment, record.status);
    if let Some(error) = &record.error {
        println!("  error: {error}");
    }
    for (name, values) in &record.metrics {
        if let Some(value) = values.last() {
            println!("  {name}: {value}");
        }
    }
    for file in &record.output_files {
        println!("  {file}");
    }
}

pub fn run(args: &SubmitArgs, config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let spec = build_spec(args)?;
    let workspace = load_workspace(config)?;
    let runner = runner(workspace);
    let run = runner.submit(&spec, &args.experiment)?;
    println!("submitted {}", run.id());
    // the backend lives in this process, so the command always waits
    let status = run.wait_for_completion(args.show_output)?;
    print_run(&run);
    if status == RunStatus::Failed {
        return Err(format!("run {} failed", run.id()).into());
    }
    Ok(())
}
