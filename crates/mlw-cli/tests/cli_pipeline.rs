use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn mlw(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mlw"))
        .args(args)
        .current_dir(cwd)
        .env_remove("MLW_CONFIG")
        .env("RUST_LOG", "warn")
        .output()
        .expect("run mlw")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "mlw failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn init_train_register_list() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    stdout(&mlw(
        root,
        &[
            "workspace",
            "init",
            "--subscription-id",
            "sub-1",
            "--resource-group",
            "rg-1",
            "--name",
            "ws-1",
        ],
    ));
    stdout(&mlw(
        root,
        &["sample-data", "--out", "diabetes.csv", "--rows", "1500", "--seed", "1"],
    ));
    stdout(&mlw(
        root,
        &[
            "materialize",
            "--folder",
            "diabetes-training",
            "--builtin",
            "--data",
            "diabetes.csv",
        ],
    ));

    let submitted = stdout(&mlw(
        root,
        &[
            "submit",
            "--source-dir",
            "diabetes-training",
            "--entry",
            "diabetes_training.toml",
            "--target",
            "inline",
            "--param",
            "reg_rate=0.1",
            "--experiment",
            "diabetes-training",
        ],
    ));
    let run_id = submitted
        .lines()
        .find_map(|line| line.strip_prefix("submitted "))
        .expect("run id")
        .trim()
        .to_string();
    assert!(submitted.contains("completed"));
    assert!(submitted.contains("Regularization Rate: 0.1"));
    assert!(submitted.contains("outputs/diabetes_model.bin"));

    stdout(&mlw(
        root,
        &[
            "model",
            "register",
            "--run",
            &run_id,
            "--name",
            "diabetes_model",
            "--tag",
            "Training context=Inline Training",
            "--metric-property",
            "AUC",
            "--metric-property",
            "Accuracy",
        ],
    ));

    let listed = stdout(&mlw(root, &["model", "list"]));
    assert!(listed.contains("diabetes_model version: 1"));
    assert!(listed.contains("\t Training context : Inline Training"));
    assert!(listed.contains("\t AUC : "));

    let runs = stdout(&mlw(root, &["run", "list"]));
    assert!(runs.contains(&run_id));
    let shown = stdout(&mlw(root, &["run", "show", &run_id, "--logs"]));
    assert!(shown.contains("Loading Data..."));
}

#[test]
fn commands_fail_without_a_workspace() {
    let dir = tempdir().expect("tempdir");
    let output = mlw(dir.path(), &["workspace", "show"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("workspace.not_found"));
}
