use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use mlw_core::errors::{ErrorInfo, MlwError};
use mlw_core::metrics::{MetricValue, RunLogger};
use mlw_core::params::{to_args, ParamMap};
use serde::Deserialize;

use super::{ExecutionBackend, LaunchRequest};
use crate::run::{RunHandle, RunOutcome};
use crate::spec::{ComputeTarget, TrainingJobSpec};

/// Stdout prefix marking a metric callback line.
pub const METRIC_PREFIX: &str = "##mlw[metric] ";

#[derive(Debug, Deserialize)]
struct MetricCallback {
    name: String,
    value: MetricValue,
}

/// Runs the entry script as a child process in the run snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

impl ProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

fn interpreter_for(entry_script: &str, configured: Option<&str>) -> Option<String> {
    if let Some(interpreter) = configured {
        return Some(interpreter.to_string());
    }
    match Path::new(entry_script)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some("py") => Some("python3".to_string()),
        Some("sh") => Some("sh".to_string()),
        _ => None,
    }
}

fn build_command(request: &LaunchRequest) -> Command {
    let mut command =
        match interpreter_for(&request.entry_script, request.environment.interpreter.as_deref()) {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&request.entry_script);
                command
            }
            None => Command::new(request.snapshot_dir.join(&request.entry_script)),
        };
    let dependencies: Vec<String> = request
        .environment
        .dependencies
        .iter()
        .map(ToString::to_string)
        .collect();
    command
        .args(to_args(&request.parameters))
        .current_dir(&request.snapshot_dir)
        .env("MLW_RUN_ID", &request.run_id)
        .env("MLW_EXPERIMENT", &request.experiment)
        .env("MLW_OUTPUT_DIR", request.snapshot_dir.join("outputs"))
        .env("MLW_ENVIRONMENT", &request.environment.name)
        .env("MLW_DEPENDENCIES", dependencies.join(" "))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

/// Feeds one stdout line to the run: metric callbacks become metrics,
/// anything else is output.
fn route_stdout_line(handle: &RunHandle, line: &str) {
    let Some(payload) = line.strip_prefix(METRIC_PREFIX) else {
        handle.log_line(line);
        return;
    };
    match serde_json::from_str::<MetricCallback>(payload) {
        Ok(callback) => handle.log_metric(&callback.name, callback.value),
        Err(err) => {
            log::warn!("malformed metric line from run {}: {err}", handle.id());
            handle.log_line(line);
        }
    }
}

fn pump<R: Read>(reader: R, mut on_line: impl FnMut(&str)) {
    for line in BufReader::new(reader).lines() {
        match line {
            Ok(line) => on_line(line.trim_end_matches('\r')),
            Err(_) => break,
        }
    }
}

fn execute(request: LaunchRequest, handle: RunHandle) {
    if let Err(err) = handle.mark_running() {
        log::warn!("{err}");
    }
    let outcome = match run_child(&request, &handle) {
        Ok(status) if status.success() => RunOutcome::Completed {
            exit_code: status.code(),
        },
        Ok(status) => RunOutcome::Failed {
            error: format!("entry script exited with {status}"),
            exit_code: status.code(),
        },
        Err(message) => RunOutcome::Failed {
            error: message,
            exit_code: None,
        },
    };
    if let Err(err) = handle.finish(outcome) {
        log::warn!("{err}");
    }
}

fn run_child(
    request: &LaunchRequest,
    handle: &RunHandle,
) -> Result<std::process::ExitStatus, String> {
    let outputs = request.snapshot_dir.join("outputs");
    fs::create_dir_all(&outputs).map_err(|err| format!("{}: {err}", outputs.display()))?;
    let mut child = build_command(request)
        .spawn()
        .map_err(|err| format!("failed to start {}: {err}", request.entry_script))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_handle = handle.clone();
    let err_handle = handle.clone();
    let readers = [
        stdout.map(|pipe| {
            thread::spawn(move || pump(pipe, |line| route_stdout_line(&out_handle, line)))
        }),
        stderr.map(|pipe| thread::spawn(move || pump(pipe, |line| err_handle.log_line(line)))),
    ];
    let status = child
        .wait()
        .map_err(|err| format!("failed to wait for {}: {err}", request.entry_script));
    for reader in readers.into_iter().flatten() {
        let _ = reader.join();
    }
    status
}

impl ExecutionBackend for ProcessBackend {
    fn target(&self) -> ComputeTarget {
        ComputeTarget::Local
    }

    fn prepare(&self, spec: &TrainingJobSpec) -> Result<ParamMap, MlwError> {
        Ok(spec.parameters.clone())
    }

    fn launch(&self, request: LaunchRequest, handle: RunHandle) -> Result<(), MlwError> {
        let run_id = request.run_id.clone();
        thread::Builder::new()
            .name(format!("mlw-run-{run_id}"))
            .spawn(move || execute(request, handle))
            .map(|_| ())
            .map_err(|err| {
                MlwError::Execution(
                    ErrorInfo::new("backend.spawn", err.to_string()).with_context("run", run_id),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpreter_follows_extension() {
        assert_eq!(interpreter_for("train.py", None).as_deref(), Some("python3"));
        assert_eq!(interpreter_for("train.sh", None).as_deref(), Some("sh"));
        assert_eq!(interpreter_for("train", None), None);
        assert_eq!(
            interpreter_for("train.py", Some("python3.11")).as_deref(),
            Some("python3.11")
        );
    }
}
