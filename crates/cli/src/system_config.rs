//! User configuration file
//!
//! Lives at `<config dir>/ripple/config.toml` unless `--config` names
//! another file. A missing file means defaults.

use anyhow::{Context, Result};
use ripple_core::RealtimeConfig;
use std::path::{Path, PathBuf};

/// Resolve the config file location
pub fn config_file_path(override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    let dir = dirs::config_dir().context("Could not determine the user config directory")?;
    Ok(dir.join("ripple").join("config.toml"))
}

pub fn load(path: &Path) -> Result<RealtimeConfig> {
    RealtimeConfig::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Validate and write the config, creating parent directories
pub fn save(path: &Path, config: &RealtimeConfig) -> Result<()> {
    config.validate().context("Invalid configuration value")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let contents = config.to_toml_string()?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Write the defaults if no file exists yet; returns whether it wrote one
pub fn init_if_missing(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save(path, &RealtimeConfig::default())?;
    Ok(true)
}

pub fn example_config() -> &'static str {
    r#"# Ripple configuration

# Log channel connect/disconnect/status at info level
debug = false

[defaults]
# Schema for topics that do not name one
schema = "public"

# Quiet period before a refresh, per scope kind (0-60000 ms)
workspace_debounce_ms = 500
entity_debounce_ms = 300
global_debounce_ms = 1000

# Bound used when max-wait is enabled without a value (1-600000 ms)
max_wait_ms = 5000
"#
}
