use std::error::Error;
use std::path::Path;

use clap::{Args, Subcommand};

use super::submit::print_run;
use super::{load_workspace, runner};

#[derive(Subcommand, Debug)]
pub enum RunCommand {
    /// Show one run, including its captured output.
    Show(ShowArgs),
    /// List runs, oldest first.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub run_id: String,
    /// Also print the captured log lines.
    #[arg(long)]
    pub logs: bool,
    /// Print the raw run record as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub experiment: Option<String>,
}

pub fn run(cmd: &RunCommand, config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let runner = runner(load_workspace(config)?);
    match cmd {
        RunCommand::Show(args) => {
            let run = runner.get_run(&args.run_id)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&run.record())?);
            } else {
                print_run(&run);
            }
            if args.logs {
                for line in run.log_lines() {
                    println!("{line}");
                }
            }
        }
        RunCommand::List(args) => {
            for run in runner.list_runs(args.experiment.as_deref())? {
                let record = run.record();
                println!(
                    "{}\t{}\t{}\t{}",
                    record.id, record.status, record.compute_target, record.submitted_at
                );
            }
        }
    }
    Ok(())
}
