use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use mlw_workspace::{Credentials, Workspace, WorkspaceConfig};

use super::load_workspace;

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// Write `mlw.json` into a directory and create the storage layout.
    Init(InitArgs),
    /// Print the resolved workspace as JSON.
    Show,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory receiving the config file.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
    #[arg(long)]
    pub subscription_id: String,
    #[arg(long)]
    pub resource_group: String,
    /// Workspace name.
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "local")]
    pub region: String,
    /// Storage root for runs and models; relative to `--dir`.
    #[arg(long)]
    pub storage_root: Option<PathBuf>,
    /// Access token stored with the config.
    #[arg(long)]
    pub token: Option<String>,
    /// RFC 3339 token expiry.
    #[arg(long, requires = "token")]
    pub expires_at: Option<String>,
}

pub fn run(cmd: &WorkspaceCommand, config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match cmd {
        WorkspaceCommand::Init(args) => init(args),
        WorkspaceCommand::Show => {
            let workspace = load_workspace(config)?;
            println!("{}", serde_json::to_string_pretty(&workspace)?);
            Ok(())
        }
    }
}

fn init(args: &InitArgs) -> Result<(), Box<dyn Error>> {
    let mut config =
        WorkspaceConfig::new(&args.subscription_id, &args.resource_group, &args.name);
    config.region = args.region.clone();
    config.storage_root = args.storage_root.clone();
    config.credentials = args.token.as_ref().map(|token| Credentials {
        token: token.clone(),
        expires_at: args.expires_at.clone(),
    });
    let workspace = Workspace::create(&args.dir, &config)?;
    println!(
        "workspace {} ready at {} (config {})",
        workspace.name(),
        workspace.root().display(),
        workspace.config_path().display()
    );
    Ok(())
}
