use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use toml::Value;

use crate::bus::BusSettings;
use crate::logging::{LogConfig, LogDestination, LogFormat, parse_log_level};

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

/// Configuration manager for the exchange core
pub struct ConfigManager {
    config: Configuration,
    _config_file_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a ConfigManager from a Configuration (primarily for testing)
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            _config_file_path: None,
        }
    }

    /// Load configuration using the discovery hierarchy
    pub fn load() -> Result<Self> {
        debug!("Starting configuration discovery");

        for path in discover_config_files() {
            debug!("Attempting to load config from: {}", path.display());
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                return Self::load_from_file(path);
            }
        }

        info!("No configuration file found, using defaults");
        Ok(Self {
            config: Configuration::new(),
            _config_file_path: None,
        })
    }

    /// Load configuration from an explicit file path
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(Self {
            config,
            _config_file_path: Some(path),
        })
    }

    /// Get a value from a section
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        self.config.get(section).and_then(|s| s.get(key))
    }

    /// Get a value parsed as usize
    pub fn get_usize(&self, section: &str, key: &str) -> Result<Option<usize>> {
        self.get_value(section, key)
            .map(|v| {
                v.parse::<usize>()
                    .with_context(|| format!("Invalid integer for {}.{}: {}", section, key, v))
            })
            .transpose()
    }

    /// Get a value parsed as milliseconds
    pub fn get_millis(&self, section: &str, key: &str) -> Result<Option<Duration>> {
        Ok(self
            .get_usize(section, key)?
            .map(|ms| Duration::from_millis(ms as u64)))
    }

    /// Build bus settings from the `[scheduler]` section
    pub fn bus_settings(&self) -> Result<BusSettings> {
        let defaults = BusSettings::default();
        Ok(BusSettings {
            reorder_cap_factor: self
                .get_usize("scheduler", "reorder-cap-factor")?
                .unwrap_or(defaults.reorder_cap_factor),
            idle_wait: self
                .get_millis("scheduler", "idle-wait-ms")?
                .unwrap_or(defaults.idle_wait),
        })
    }

    /// Build logging configuration from the `[logging]` section
    pub fn log_config(&self) -> Result<LogConfig> {
        let defaults = LogConfig::default();
        let console_level = self
            .get_value("logging", "level")
            .map(|v| parse_log_level(v))
            .transpose()?
            .unwrap_or(defaults.console_level);
        let file_level = self
            .get_value("logging", "file-level")
            .map(|v| parse_log_level(v))
            .transpose()?;
        let format = self
            .get_value("logging", "format")
            .map(|v| v.parse::<LogFormat>().map_err(anyhow::Error::msg))
            .transpose()?
            .unwrap_or(defaults.format);
        let destination = match self.get_value("logging", "file") {
            Some(path) => LogDestination::Both(PathBuf::from(path)),
            None => LogDestination::Console,
        };
        // A file destination without an explicit file level mirrors the
        // console level.
        let file_level = match (&destination, file_level) {
            (LogDestination::Console, level) => level,
            (_, None) => Some(console_level),
            (_, level) => level,
        };
        Ok(LogConfig {
            console_level,
            file_level,
            format,
            destination,
        })
    }
}

/// Configuration discovery hierarchy: project file first, then the user's
/// config directory.
fn discover_config_files() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("plugbus.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("plugbus").join("config.toml"));
    }
    paths
}

/// Flatten parsed TOML into section -> key -> string values
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let parsed: Value = content.parse().context("Invalid TOML syntax")?;
    let mut config = Configuration::new();

    if let Value::Table(table) = parsed {
        for (section_name, section_value) in table {
            match section_value {
                Value::Table(section_table) => {
                    let section = config.entry(section_name).or_default();
                    for (key, value) in section_table {
                        section.insert(key, toml_value_to_string(&value));
                    }
                }
                other => {
                    // Top-level keys land in an unnamed base section.
                    config
                        .entry(String::new())
                        .or_default()
                        .insert(section_name, toml_value_to_string(&other));
                }
            }
        }
    }

    Ok(config)
}

fn toml_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
