pub mod materialize;
pub mod model;
pub mod run;
pub mod sample_data;
pub mod submit;
pub mod workspace;

use std::path::Path;

use mlw_core::MlwError;
use mlw_exp::Runner;
use mlw_workspace::Workspace;

/// Loads the workspace from `config` when given, otherwise from the
/// environment or the current directory.
pub fn load_workspace(config: Option<&Path>) -> Result<Workspace, MlwError> {
    match config {
        Some(path) => Workspace::from_config(path),
        None => Workspace::load(),
    }
}

/// Runner with the built-in routines available to the inline target.
pub fn runner(workspace: Workspace) -> Runner {
    Runner::new(workspace).with_routines(mlw_train::builtin_routines())
}
