use std::error::Error;
use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct SampleDataArgs {
    /// Destination CSV file.
    #[arg(long, default_value = "diabetes.csv")]
    pub out: PathBuf,
    #[arg(long, default_value_t = 10_000)]
    pub rows: usize,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

pub fn run(args: &SampleDataArgs) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    mlw_train::write_csv(&args.out, args.rows, args.seed)?;
    println!("wrote {} rows to {}", args.rows, args.out.display());
    Ok(())
}
