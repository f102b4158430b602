#![doc = "Core error, parameter and metric types shared by the mlw crates."]

pub mod errors;
pub mod metrics;
pub mod names;
pub mod params;
pub mod rng;
pub mod serde;

pub use errors::{ErrorInfo, MlwError};
pub use metrics::{latest, MemoryLogger, MetricLog, MetricValue, RunLogger};
pub use names::validate_resource_name;
pub use params::{
    parse_assignment, to_args, validate_param_name, validate_param_value, validate_params, ParamMap,
    ParamValue,
};
pub use rng::RngHandle;
pub use self::serde::{
    from_json_slice, sha256_hex, stable_hash_string, to_canonical_json_bytes,
    to_canonical_json_string,
};
