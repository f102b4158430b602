use std::fs;
use std::path::Path;

use mlw_core::MlwError;
use mlw_exp::{materialize, ScriptSource};
use tempfile::tempdir;

fn listing(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .expect("read_dir")
        .map(|entry| {
            let entry = entry.expect("entry");
            (
                entry.file_name().to_string_lossy().into_owned(),
                fs::read(entry.path()).expect("read"),
            )
        })
        .collect();
    entries.sort();
    entries
}

#[test]
fn materializing_twice_is_idempotent() {
    let inputs = tempdir().expect("tempdir");
    let data = inputs.path().join("diabetes.csv");
    fs::write(&data, "Pregnancies,Diabetic\n1,0\n3,1\n").expect("write data");
    let script = ScriptSource::new(
        "diabetes_training.py",
        "import argparse\nprint('training')\n",
    );

    let out = tempdir().expect("tempdir");
    let folder = out.path().join("diabetes-training");
    let first = materialize(&folder, &script, &[data.clone()]).expect("first");
    let before = listing(&folder);
    let second = materialize(&folder, &script, &[data]).expect("second");
    assert_eq!(first, second);
    assert_eq!(listing(&folder), before);
    assert_eq!(before.len(), 2);
    assert_eq!(
        fs::read_to_string(&first.script_path).expect("script"),
        script.text
    );
    assert_eq!(
        fs::read(&first.data_files[0]).expect("copy"),
        b"Pregnancies,Diabetic\n1,0\n3,1\n"
    );
}

#[test]
fn existing_folder_is_reused() {
    let out = tempdir().expect("tempdir");
    let folder = out.path().join("work");
    fs::create_dir_all(&folder).expect("mkdir");
    fs::write(folder.join("notes.txt"), "keep me").expect("write");
    materialize(&folder, &ScriptSource::new("train.sh", "echo hi\n"), &[]).expect("materialize");
    assert_eq!(
        fs::read_to_string(folder.join("notes.txt")).expect("notes"),
        "keep me"
    );
    assert!(folder.join("train.sh").is_file());
}

#[test]
fn missing_data_file_is_rejected_before_writing() {
    let out = tempdir().expect("tempdir");
    let folder = out.path().join("work");
    let err = materialize(
        &folder,
        &ScriptSource::new("train.py", ""),
        &[out.path().join("absent.csv")],
    )
    .expect_err("missing data");
    assert!(matches!(err, MlwError::Validation(_)));
    assert_eq!(err.info().code, "materialize.data_missing");
    assert!(!folder.exists());
}

#[test]
fn data_file_named_like_script_is_rejected() {
    let inputs = tempdir().expect("tempdir");
    let clash = inputs.path().join("train.py");
    fs::write(&clash, "data").expect("write");
    let err = materialize(
        &inputs.path().join("work"),
        &ScriptSource::new("train.py", "print(1)"),
        &[clash],
    )
    .expect_err("clash");
    assert_eq!(err.info().code, "materialize.name_clash");
}

#[test]
fn script_name_must_be_plain() {
    let out = tempdir().expect("tempdir");
    let err = materialize(out.path(), &ScriptSource::new("../escape.py", ""), &[])
        .expect_err("path in name");
    assert_eq!(err.info().code, "materialize.script_name");
}
