use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use mlw_exp::{materialize, ScriptSource};
use mlw_train::DiabetesTraining;

/// File name used for the built-in routine manifest.
const BUILTIN_SCRIPT: &str = "diabetes_training.toml";

#[derive(Args, Debug)]
pub struct MaterializeArgs {
    /// Folder to create or reuse.
    #[arg(long)]
    pub folder: PathBuf,
    /// Training script copied verbatim into the folder.
    #[arg(long, required_unless_present = "builtin", conflicts_with = "builtin")]
    pub script: Option<PathBuf>,
    /// Write a manifest for the built-in diabetes routine instead of a script.
    #[arg(long)]
    pub builtin: bool,
    /// Default regularization rate baked into the built-in manifest.
    #[arg(long = "reg_rate", default_value_t = 0.01, requires = "builtin")]
    pub reg_rate: f64,
    /// Data files copied next to the script.
    #[arg(long = "data", value_name = "PATH")]
    pub data: Vec<PathBuf>,
}

pub fn run(args: &MaterializeArgs) -> Result<(), Box<dyn Error>> {
    let script = match &args.script {
        Some(path) => ScriptSource::from_file(path)?,
        None => ScriptSource::new(BUILTIN_SCRIPT, DiabetesTraining::manifest(args.reg_rate)),
    };
    let folder = materialize(&args.folder, &script, &args.data)?;
    println!("{}", folder.script_path.display());
    for data in &folder.data_files {
        println!("{}", data.display());
    }
    Ok(())
}
