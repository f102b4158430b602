use std::fs;
use std::path::PathBuf;

use mlw_core::{MetricValue, MlwError, RunLogger};
use mlw_exp::{
    RoutineContext, RoutineRegistry, RunStatus, Runner, TrainingJobSpec, TrainingRoutine,
};
use mlw_workspace::{Workspace, WorkspaceConfig};
use tempfile::{tempdir, TempDir};

/// Echoes its arguments and writes a fixed artifact.
struct EchoRoutine;

impl TrainingRoutine for EchoRoutine {
    fn name(&self) -> &str {
        "echo"
    }

    fn run(&self, ctx: &RoutineContext) -> Result<(), MlwError> {
        ctx.print(format!("args: {}", ctx.args.join(" ")));
        let data = fs::read_to_string(ctx.path("data.txt"))
            .map_err(|err| MlwError::io("echo.read", &ctx.path("data.txt"), err))?;
        ctx.logger.log("Rows", data.lines().count() as f64);
        ctx.logger.log_list("Curve", &[0.1, 0.2]);
        ctx.logger.log_text("Note", "ok");
        fs::write(ctx.output_dir.join("model.bin"), b"weights")
            .map_err(|err| MlwError::io("echo.write", &ctx.output_dir, err))?;
        Ok(())
    }
}

struct PanickingRoutine;

impl TrainingRoutine for PanickingRoutine {
    fn name(&self) -> &str {
        "explode"
    }

    fn run(&self, _ctx: &RoutineContext) -> Result<(), MlwError> {
        panic!("diverged");
    }
}

struct FailingRoutine;

impl TrainingRoutine for FailingRoutine {
    fn name(&self) -> &str {
        "fail"
    }

    fn run(&self, _ctx: &RoutineContext) -> Result<(), MlwError> {
        Err(MlwError::validation("fail.always", "label column missing"))
    }
}

/// Logs a diverged loss and stops.
struct DivergingRoutine;

impl TrainingRoutine for DivergingRoutine {
    fn name(&self) -> &str {
        "diverge"
    }

    fn run(&self, ctx: &RoutineContext) -> Result<(), MlwError> {
        ctx.logger.log("Loss", f64::NAN);
        ctx.logger.log_list("Curve", &[1.0, f64::INFINITY]);
        Err(MlwError::validation("diverge.loss", "loss is not finite"))
    }
}

fn setup() -> (TempDir, Runner, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let ws = Workspace::create(dir.path(), &WorkspaceConfig::new("sub", "rg", "ws"))
        .expect("workspace");
    let routines = RoutineRegistry::new()
        .with(EchoRoutine)
        .with(PanickingRoutine)
        .with(FailingRoutine)
        .with(DivergingRoutine);
    let folder = dir.path().join("job");
    fs::create_dir_all(&folder).expect("mkdir");
    fs::write(folder.join("data.txt"), "a\nb\nc\n").expect("data");
    fs::write(
        folder.join("echo.toml"),
        "routine = \"echo\"\n[defaults]\nreg_rate = 0.01\nepochs = 3\n",
    )
    .expect("manifest");
    fs::write(folder.join("explode.toml"), "routine = \"explode\"\n").expect("manifest");
    fs::write(folder.join("fail.toml"), "routine = \"fail\"\n").expect("manifest");
    fs::write(folder.join("ghost.toml"), "routine = \"ghost\"\n").expect("manifest");
    fs::write(folder.join("diverge.toml"), "routine = \"diverge\"\n").expect("manifest");
    (dir, Runner::new(ws).with_routines(routines), folder)
}

#[test]
fn inline_routine_completes_with_merged_parameters() {
    let (_dir, runner, folder) = setup();
    let spec = TrainingJobSpec::new(&folder, "echo.toml")
        .with_target("inline")
        .with_parameter("reg_rate", 0.1);
    let run = runner.submit(&spec, "inline-exp").expect("submit");
    assert_eq!(run.wait_for_completion(false).expect("wait"), RunStatus::Completed);
    assert_eq!(
        run.log_lines(),
        vec!["args: --epochs 3 --reg_rate 0.1".to_string()]
    );
    assert_eq!(run.metric("Rows"), Some(MetricValue::Number(3.0)));
    assert_eq!(run.metric("Curve"), Some(MetricValue::List(vec![0.1, 0.2])));
    assert_eq!(run.metric("Note"), Some(MetricValue::Text("ok".into())));
    assert_eq!(run.output_files(), vec!["outputs/model.bin".to_string()]);
}

#[test]
fn routine_errors_and_panics_fail_the_run() {
    let (_dir, runner, folder) = setup();
    for entry in ["explode.toml", "fail.toml"] {
        let spec = TrainingJobSpec::new(&folder, entry).with_target("inline");
        let run = runner.submit(&spec, "inline-exp").expect("submit");
        assert_eq!(run.wait_for_completion(false).expect("wait"), RunStatus::Failed);
        assert!(run.record().error.is_some());
        assert!(run.output_files().is_empty());
    }
}

#[test]
fn unknown_routine_is_rejected_at_submission() {
    let (_dir, runner, folder) = setup();
    let spec = TrainingJobSpec::new(&folder, "ghost.toml").with_target("inline");
    let err = runner.submit(&spec, "inline-exp").expect_err("unknown routine");
    assert!(matches!(err, MlwError::Validation(_)));
    assert_eq!(err.info().code, "routine.unknown");

    let spec = TrainingJobSpec::new(&folder, "data.txt").with_target("inline");
    let err = runner.submit(&spec, "inline-exp").expect_err("not a manifest");
    assert_eq!(err.info().code, "routine.manifest");
}

#[test]
fn job_file_resolves_source_dir_relative_to_itself() {
    let (dir, runner, _folder) = setup();
    let job = dir.path().join("job.yml");
    fs::write(
        &job,
        "source_dir: job\nentry_script: echo.toml\ncompute_target: inline\nparameters:\n  epochs: 1\n",
    )
    .expect("job");
    let spec = TrainingJobSpec::from_file(&job).expect("parse");
    assert_eq!(spec.source_dir, dir.path().join("job"));
    let run = runner.submit(&spec, "from-file").expect("submit");
    assert_eq!(run.wait_for_completion(false).expect("wait"), RunStatus::Completed);
    assert_eq!(
        run.log_lines(),
        vec!["args: --epochs 1 --reg_rate 0.01".to_string()]
    );
}

#[test]
fn non_finite_values_never_break_run_listing() {
    let (_dir, runner, folder) = setup();
    let good = TrainingJobSpec::new(&folder, "echo.toml").with_target("inline");
    let first = runner.submit(&good, "nan-exp").expect("submit");
    assert_eq!(first.wait_for_completion(false).expect("wait"), RunStatus::Completed);

    let (name, value) = mlw_core::parse_assignment("reg_rate=0.1").expect("assignment");
    assert!(mlw_core::parse_assignment("reg_rate=nan").is_err());
    let nan_param = TrainingJobSpec::new(&folder, "echo.toml")
        .with_target("inline")
        .with_parameter(name, value)
        .with_parameter("epochs", f64::NAN);
    let err = runner.submit(&nan_param, "nan-exp").expect_err("nan parameter");
    assert!(matches!(err, MlwError::Validation(_)));
    assert_eq!(err.info().code, "params.non_finite");

    let diverging = TrainingJobSpec::new(&folder, "diverge.toml").with_target("inline");
    let second = runner.submit(&diverging, "nan-exp").expect("submit");
    assert_eq!(second.wait_for_completion(false).expect("wait"), RunStatus::Failed);

    let reloaded = runner.get_run(&second.id()).expect("reload");
    assert_eq!(reloaded.status(), RunStatus::Failed);
    assert_eq!(reloaded.metric("Loss"), Some(MetricValue::Text("NaN".into())));
    assert_eq!(reloaded.metric("Curve"), Some(MetricValue::Text("[1, inf]".into())));

    let ids: Vec<String> = runner
        .list_runs(Some("nan-exp"))
        .expect("list")
        .iter()
        .map(|run| run.id())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.id()));
    assert!(ids.contains(&second.id()));
}
