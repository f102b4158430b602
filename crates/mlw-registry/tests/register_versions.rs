use std::fs;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use mlw_core::MlwError;
use mlw_exp::{
    RoutineContext, RoutineRegistry, Run, RunStatus, Runner, TrainingJobSpec, TrainingRoutine,
};
use mlw_registry::{export_csv, Metadata, ModelRegistry};
use mlw_workspace::{Workspace, WorkspaceConfig};
use tempfile::{tempdir, TempDir};

/// Writes `outputs/model.bin` containing its arguments.
struct WriteModel;

impl TrainingRoutine for WriteModel {
    fn name(&self) -> &str {
        "write-model"
    }

    fn run(&self, ctx: &RoutineContext) -> Result<(), MlwError> {
        let path = ctx.output_dir.join("model.bin");
        fs::write(&path, ctx.args.join(" ")).map_err(|err| MlwError::io("test.write", &path, err))
    }
}

/// Blocks until the gate opens.
struct Gated(Arc<(Mutex<bool>, Condvar)>);

impl TrainingRoutine for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    fn run(&self, _ctx: &RoutineContext) -> Result<(), MlwError> {
        let (open, cvar) = &*self.0;
        let mut open = open.lock().expect("gate");
        while !*open {
            open = cvar.wait(open).expect("gate");
        }
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    workspace: Workspace,
    runner: Runner,
    gate: Arc<(Mutex<bool>, Condvar)>,
    folder: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempdir().expect("tempdir");
    let workspace = Workspace::create(dir.path(), &WorkspaceConfig::new("sub", "rg", "ws"))
        .expect("workspace");
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let routines = RoutineRegistry::new()
        .with(WriteModel)
        .with(Gated(Arc::clone(&gate)));
    let folder = dir.path().join("job");
    fs::create_dir_all(&folder).expect("mkdir");
    fs::write(folder.join("train.toml"), "routine = \"write-model\"\n").expect("manifest");
    fs::write(folder.join("gated.toml"), "routine = \"gated\"\n").expect("manifest");
    let runner = Runner::new(workspace.clone()).with_routines(routines);
    Fixture {
        _dir: dir,
        workspace,
        runner,
        gate,
        folder,
    }
}

impl Fixture {
    fn completed_run(&self, context: &str) -> Run {
        let spec = TrainingJobSpec::new(&self.folder, "train.toml")
            .with_target("inline")
            .with_parameter("context", context);
        let run = self.runner.submit(&spec, "diabetes-training").expect("submit");
        assert_eq!(run.wait_for_completion(false).expect("wait"), RunStatus::Completed);
        run
    }
}

fn tags(context: &str) -> Metadata {
    Metadata::from([("Training context".to_string(), context.to_string())])
}

#[test]
fn repeated_registration_yields_consecutive_versions() {
    let fx = fixture();
    let registry = ModelRegistry::open(&fx.workspace).expect("registry");
    let run = fx.completed_run("Inline");
    for expected in 1..=4u32 {
        let model = registry
            .register(&run, "outputs/model.bin", "diabetes_model", &Metadata::new(), &Metadata::new())
            .expect("register");
        assert_eq!(model.version, expected);
        assert!(model.stored_path.is_file());
        assert_eq!(model.source_path, "outputs/model.bin");
        assert_eq!(model.run_id, run.id());
    }
    let versions: Vec<u32> = registry.list().expect("list").iter().map(|m| m.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
    assert_eq!(registry.latest("diabetes_model").expect("latest").version, 4);
}

#[test]
fn two_runs_keep_their_training_context_tags() {
    let fx = fixture();
    let registry = ModelRegistry::open(&fx.workspace).expect("registry");
    let inline = fx.completed_run("Inline Training");
    let script = fx.completed_run("Script");

    let properties = Metadata::from([
        ("AUC".to_string(), "0.8568".to_string()),
        ("Accuracy".to_string(), "0.774".to_string()),
    ]);
    registry
        .register(&inline, "outputs/model.bin", "diabetes_model", &tags("Inline Training"), &properties)
        .expect("first");
    registry
        .register(&script, "./outputs/model.bin", "diabetes_model", &tags("Script"), &Metadata::new())
        .expect("second");

    let listed = registry.list().expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].tags["Training context"], "Inline Training");
    assert_eq!(listed[0].properties, properties);
    assert_eq!(listed[1].tags["Training context"], "Script");
    assert_eq!(listed[1].run_id, script.id());
    assert_ne!(listed[0].sha256, listed[1].sha256);
    assert_eq!(
        listed[1].to_string(),
        "diabetes_model version: 2\n\t Training context : Script"
    );

    let reopened = ModelRegistry::open(&fx.workspace).expect("reopen");
    assert_eq!(reopened.list().expect("list"), listed);

    let csv_path = fx.workspace.root().join("models.csv");
    export_csv(&listed, &csv_path).expect("csv");
    let csv_text = fs::read_to_string(csv_path).expect("read csv");
    assert_eq!(csv_text.lines().count(), 3);
}

#[test]
fn listing_orders_by_name_then_version() {
    let fx = fixture();
    let registry = ModelRegistry::open(&fx.workspace).expect("registry");
    let run = fx.completed_run("x");
    for name in ["zeta", "alpha", "zeta", "alpha", "mid"] {
        registry
            .register(&run, "outputs/model.bin", name, &Metadata::new(), &Metadata::new())
            .expect("register");
    }
    let order: Vec<(String, u32)> = registry
        .list()
        .expect("list")
        .into_iter()
        .map(|m| (m.name, m.version))
        .collect();
    assert_eq!(
        order,
        vec![
            ("alpha".to_string(), 1),
            ("alpha".to_string(), 2),
            ("mid".to_string(), 1),
            ("zeta".to_string(), 1),
            ("zeta".to_string(), 2),
        ]
    );
}

#[test]
fn unfinished_or_failed_runs_cannot_register() {
    let fx = fixture();
    let registry = ModelRegistry::open(&fx.workspace).expect("registry");
    let spec = TrainingJobSpec::new(&fx.folder, "gated.toml").with_target("inline");
    let pending = fx.runner.submit(&spec, "gated").expect("submit");

    let err = registry
        .register(&pending, "outputs/model.bin", "m", &Metadata::new(), &Metadata::new())
        .expect_err("not completed");
    assert!(matches!(err, MlwError::ArtifactNotFound(_)));
    assert_eq!(err.info().code, "registry.run_not_completed");
    assert!(registry.list().expect("list").is_empty());

    {
        let (open, cvar) = &*fx.gate;
        *open.lock().expect("gate") = true;
        cvar.notify_all();
    }
    assert_eq!(pending.wait_for_completion(false).expect("wait"), RunStatus::Completed);

    // completed, but produced nothing
    let err = registry
        .register(&pending, "outputs/model.bin", "m", &Metadata::new(), &Metadata::new())
        .expect_err("no artifact");
    assert_eq!(err.info().code, "registry.artifact_missing");
    assert!(registry.list().expect("list").is_empty());
}

#[test]
fn invalid_model_name_is_validation_error() {
    let fx = fixture();
    let registry = ModelRegistry::open(&fx.workspace).expect("registry");
    let run = fx.completed_run("x");
    let err = registry
        .register(&run, "outputs/model.bin", "bad name/1", &Metadata::new(), &Metadata::new())
        .expect_err("bad name");
    assert!(matches!(err, MlwError::Validation(_)));
}

#[test]
fn deleted_versions_are_never_reused() {
    let fx = fixture();
    let registry = ModelRegistry::open(&fx.workspace).expect("registry");
    let run = fx.completed_run("x");
    let register = || {
        registry
            .register(&run, "outputs/model.bin", "diabetes_model", &Metadata::new(), &Metadata::new())
            .expect("register")
    };
    register();
    let second = register();
    let removed = registry.delete("diabetes_model", 2).expect("delete");
    assert_eq!(removed, second);
    assert!(!second.stored_path.exists());
    assert_eq!(register().version, 3);

    let err = registry.get("diabetes_model", 2).expect_err("deleted");
    assert_eq!(err.info().code, "registry.model_not_found");
    let versions: Vec<u32> = registry
        .versions("diabetes_model")
        .expect("versions")
        .iter()
        .map(|m| m.version)
        .collect();
    assert_eq!(versions, vec![1, 3]);
}

#[test]
fn concurrent_registrations_get_distinct_versions() {
    let fx = fixture();
    let run = fx.completed_run("x");
    let shared = Arc::new(ModelRegistry::open(&fx.workspace).expect("registry"));

    let mut workers = Vec::new();
    for idx in 0..8 {
        let run = run.clone();
        let workspace = fx.workspace.clone();
        let shared = Arc::clone(&shared);
        workers.push(thread::spawn(move || {
            let own;
            // half share one connection, half open their own
            let registry: &ModelRegistry = if idx % 2 == 0 {
                &shared
            } else {
                own = ModelRegistry::open(&workspace).expect("registry");
                &own
            };
            (0..5)
                .map(|_| {
                    registry
                        .register(&run, "outputs/model.bin", "shared", &Metadata::new(), &Metadata::new())
                        .expect("register")
                        .version
                })
                .collect::<Vec<_>>()
        }));
    }
    let mut versions: Vec<u32> = workers
        .into_iter()
        .flat_map(|worker| worker.join().expect("join"))
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=40).collect::<Vec<u32>>());
}
