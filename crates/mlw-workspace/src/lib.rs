//! Workspace handle: the explicit context every mlw component receives.

mod config;
mod workspace;

pub use config::{
    find_config, read_config, write_config, Credentials, WorkspaceConfig, CONFIG_CANDIDATES,
    CONFIG_FILE_NAME,
};
pub use workspace::{Workspace, CONFIG_ENV};
