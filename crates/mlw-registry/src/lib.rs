//! Model registry: named, versioned artifacts taken from completed runs.

pub mod export;
pub mod model;
pub mod registry;
pub mod schema;

pub use export::{export_csv, export_json};
pub use model::{Metadata, RegisteredModel};
pub use registry::ModelRegistry;
pub use schema::SCHEMA_VERSION;
