//! Run configuration: YAML spec, CLI overrides and validation

mod cli;
mod schema;
mod validate;

pub use cli::{apply_overrides, parse_args, Cli};
pub use schema::DistillSpec;
pub use validate::{validate_spec, ValidationError};

use crate::error::{Error, Result};
use std::path::Path;

/// Load a spec from YAML and validate it
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<DistillSpec> {
    let spec = read_config(config_path)?;
    validate_spec(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;
    Ok(spec)
}

/// Load a spec from YAML without validating it
///
/// Use when overrides still have to be applied.
pub fn read_config<P: AsRef<Path>>(config_path: P) -> Result<DistillSpec> {
    let yaml_content = std::fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;
    serde_yaml::from_str(&yaml_content)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
}
