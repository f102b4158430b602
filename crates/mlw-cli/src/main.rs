use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{
    materialize::{self, MaterializeArgs},
    model::{self, ModelCommand},
    run::{self, RunCommand},
    sample_data::{self, SampleDataArgs},
    submit::{self, SubmitArgs},
    workspace::{self, WorkspaceCommand},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "mlw", about = "Local experiment submission and model registry")]
struct Cli {
    /// Workspace config file; defaults to MLW_CONFIG or an upward search.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or inspect the workspace configuration.
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Write a training script and its data into a folder.
    Materialize(MaterializeArgs),
    /// Submit a training job and wait for it to finish.
    Submit(SubmitArgs),
    /// Inspect past runs.
    #[command(subcommand)]
    Run(RunCommand),
    /// Register, list and delete model versions.
    #[command(subcommand)]
    Model(ModelCommand),
    /// Generate a synthetic diabetes CSV.
    SampleData(SampleDataArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    log::debug!("{:?}", cli.command);
    let config = cli.config.as_deref();
    match cli.command {
        Command::Workspace(cmd) => workspace::run(&cmd, config),
        Command::Materialize(args) => materialize::run(&args),
        Command::Submit(args) => submit::run(&args, config),
        Command::Run(cmd) => run::run(&cmd, config),
        Command::Model(cmd) => model::run(&cmd, config),
        Command::SampleData(args) => sample_data::run(&args),
    }
}
