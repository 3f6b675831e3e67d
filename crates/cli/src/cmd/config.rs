//! Configuration management command
//!
//! Provides CLI interface to view and edit the realtime configuration.

use crate::system_config;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use ripple_core::RealtimeConfig;
use std::path::Path;

const KEYS: &[&str] = &[
    "debug",
    "defaults.schema",
    "defaults.workspace_debounce_ms",
    "defaults.entity_debounce_ms",
    "defaults.global_debounce_ms",
    "defaults.max_wait_ms",
];

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Unknown config key: {}. Use 'ripple config list' to see available keys.",
        key
    )
}

fn get_value(config: &RealtimeConfig, key: &str) -> Result<String> {
    let d = &config.defaults;
    let value = match key {
        "debug" => config.debug.to_string(),
        "defaults.schema" => d.schema.clone(),
        "defaults.workspace_debounce_ms" => d.workspace_debounce_ms.to_string(),
        "defaults.entity_debounce_ms" => d.entity_debounce_ms.to_string(),
        "defaults.global_debounce_ms" => d.global_debounce_ms.to_string(),
        "defaults.max_wait_ms" => d.max_wait_ms.to_string(),
        _ => return Err(unknown_key(key)),
    };
    Ok(value)
}

fn parse_ms(value: &str) -> Result<u64> {
    value
        .parse()
        .context("Invalid value: must be a non-negative integer (milliseconds)")
}

fn set_value(config: &mut RealtimeConfig, key: &str, value: &str) -> Result<()> {
    let d = &mut config.defaults;
    match key {
        "debug" => {
            config.debug = value
                .parse()
                .context("Invalid value: must be 'true' or 'false'")?;
        }
        "defaults.schema" => d.schema = value.to_string(),
        "defaults.workspace_debounce_ms" => d.workspace_debounce_ms = parse_ms(value)?,
        "defaults.entity_debounce_ms" => d.entity_debounce_ms = parse_ms(value)?,
        "defaults.global_debounce_ms" => d.global_debounce_ms = parse_ms(value)?,
        "defaults.max_wait_ms" => d.max_wait_ms = parse_ms(value)?,
        _ => return Err(unknown_key(key)),
    }
    Ok(())
}

/// List all configuration values
pub fn run_list(config_path: &Path) -> Result<()> {
    let config = system_config::load(config_path)?;

    println!("{}", "Realtime Configuration".bold());
    let location = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not created, showing defaults)", config_path.display())
    };
    println!("{}: {}\n", "Location".dimmed(), location.dimmed());

    println!("  {} = {}", "debug".cyan(), config.debug);
    println!("\n{}", "[defaults]".yellow());
    for key in KEYS.iter().filter(|key| key.starts_with("defaults.")) {
        let value = get_value(&config, key)?;
        let name = key.trim_start_matches("defaults.");
        if name.ends_with("_ms") {
            println!("  {} = {} {}", name.cyan(), value, "ms".dimmed());
        } else {
            println!("  {} = {}", name.cyan(), value);
        }
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  *_debounce_ms: 0-60,000");
    println!("  max_wait_ms: 1-600,000");
    println!("  schema: non-empty");

    Ok(())
}

/// Get a single configuration value
pub fn run_get(config_path: &Path, key: &str) -> Result<()> {
    let config = system_config::load(config_path)?;
    println!("{}", get_value(&config, key)?);
    Ok(())
}

/// Set a configuration value
pub fn run_set(config_path: &Path, key: &str, value: &str) -> Result<()> {
    let mut config = system_config::load(config_path)?;
    set_value(&mut config, key, value)?;

    // Validates before writing
    system_config::save(config_path, &config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

/// Show the config file path and optionally create it
pub fn run_path(config_path: &Path, create: bool) -> Result<()> {
    if create && system_config::init_if_missing(config_path)? {
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub fn run_example() -> Result<()> {
    print!("{}", system_config::example_config());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_round_trips() {
        let mut config = RealtimeConfig::default();
        for key in KEYS {
            let value = get_value(&config, key).unwrap();
            set_value(&mut config, key, &value).unwrap();
        }
        assert_eq!(config, RealtimeConfig::default());
    }

    #[test]
    fn test_set_parses_values() {
        let mut config = RealtimeConfig::default();
        set_value(&mut config, "debug", "true").unwrap();
        set_value(&mut config, "defaults.entity_debounce_ms", "250").unwrap();

        assert!(config.debug);
        assert_eq!(config.defaults.entity_debounce_ms, 250);
        assert!(set_value(&mut config, "debug", "yes").is_err());
        assert!(set_value(&mut config, "defaults.max_wait_ms", "-1").is_err());
    }

    #[test]
    fn test_unknown_key() {
        let mut config = RealtimeConfig::default();
        assert!(get_value(&config, "daemon.interval").is_err());
        assert!(set_value(&mut config, "daemon.interval", "1").is_err());
    }
}
