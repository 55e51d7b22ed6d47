use crate::ensemble::ToolSettings;
use crate::error::{BppError, Result};
use crate::metrics::{Alignment, Metric};
use crate::plot_file::Delimiter;
use config::{Config, Environment, File};
use std::path::Path;

/// Prefix of environment overrides, e.g. `BPP_COMPARE_PARTITION_PROGRAM`
pub const ENV_PREFIX: &str = "BPP_COMPARE";

/// What to compute when comparing two probability plots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    pub metric: Metric,
    pub alignment: Alignment,
    pub delimiter: Delimiter,
}

/// Build tool settings from defaults, an optional config file and the environment.
///
/// Later sources win: built-in defaults, then `path` (TOML, YAML or JSON by
/// extension), then `BPP_COMPARE_*` variables. Command line flags are applied
/// on top by the caller.
pub fn load_tool_settings(path: Option<&Path>) -> Result<ToolSettings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let settings: ToolSettings = builder
        .add_source(Environment::with_prefix(ENV_PREFIX))
        .build()?
        .try_deserialize()?;

    validate_tool_settings(&settings)?;
    Ok(settings)
}

pub fn validate_tool_settings(settings: &ToolSettings) -> Result<()> {
    if settings.partition_program.trim().is_empty() {
        return Err(BppError::Validation("partition_program cannot be empty".to_string()));
    }
    if settings.probability_plot_program.trim().is_empty() {
        return Err(BppError::Validation(
            "probability_plot_program cannot be empty".to_string(),
        ));
    }
    let label = &settings.sequence_label;
    if label.trim().is_empty() || label.contains(char::is_whitespace) {
        return Err(BppError::Validation(format!(
            "sequence_label must be a single non-empty word, got '{}'",
            settings.sequence_label
        )));
    }
    if settings.image.is_some() && settings.runtime.trim().is_empty() {
        return Err(BppError::Validation(
            "runtime cannot be empty when an image is configured".to_string(),
        ));
    }
    Ok(())
}
