// Logging module for plugbus
// Structured logging for the exchange core with text and JSON formats,
// console and/or file destinations, and independent level filters.
// The host installs it once at startup; every registry then reports
// through the `log` facade.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{Level, LevelFilter};
use serde::{Deserialize, Serialize};

/// Log output format options
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}. Valid options: text, json", s)),
        }
    }
}

/// Log destination options
#[derive(Debug, Clone, PartialEq)]
pub enum LogDestination {
    Console,
    File(PathBuf),
    Both(PathBuf),
}

/// JSON log entry structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub console_level: LevelFilter,
    pub file_level: Option<LevelFilter>,
    pub format: LogFormat,
    pub destination: LogDestination,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: None,
            format: LogFormat::Text,
            destination: LogDestination::Console,
        }
    }
}

/// Logger for the exchange core
pub struct BusLogger {
    config: LogConfig,
}

impl BusLogger {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }

    fn timestamp() -> String {
        let now: DateTime<Local> = Local::now();
        now.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn render(&self, level: Level, message: &str) -> String {
        match self.config.format {
            LogFormat::Text => format!(
                "{} [{}] {}",
                Self::timestamp(),
                level.to_string().to_uppercase(),
                message
            ),
            LogFormat::Json => {
                let entry = JsonLogEntry {
                    timestamp: Self::timestamp(),
                    level: level.to_string().to_uppercase(),
                    message: message.to_string(),
                    detail: None,
                };
                serde_json::to_string(&entry).unwrap_or_else(|_| {
                    format!(
                        "{} [{}] {}",
                        Self::timestamp(),
                        level.to_string().to_uppercase(),
                        message
                    )
                })
            }
        }
    }

    fn console_enabled(&self, level: Level) -> bool {
        level <= self.config.console_level
    }

    fn file_enabled(&self, level: Level) -> bool {
        self.config.file_level.map(|f| level <= f).unwrap_or(false)
    }

    fn file_path(&self) -> Option<&PathBuf> {
        match &self.config.destination {
            LogDestination::Console => None,
            LogDestination::File(path) | LogDestination::Both(path) => Some(path),
        }
    }

    fn console_wanted(&self) -> bool {
        matches!(
            self.config.destination,
            LogDestination::Console | LogDestination::Both(_)
        )
    }

    fn append_to_file(line: &str, path: &PathBuf) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        writeln!(file, "{}", line).context("Failed to write to log file")
    }
}

impl log::Log for BusLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.console_enabled(metadata.level()) || self.file_enabled(metadata.level())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = record.level();
        let line = self.render(level, &record.args().to_string());

        if self.console_wanted() && self.console_enabled(level) {
            if let Err(e) = writeln!(io::stderr(), "{}", line) {
                eprintln!("Console logging error: {}", e);
            }
        }
        if let Some(path) = self.file_path() {
            if self.file_enabled(level) {
                if let Err(e) = Self::append_to_file(&line, path) {
                    eprintln!("File logging error: {}", e);
                }
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logger(config: LogConfig) -> Result<()> {
    let max_level = match (&config.file_level, config.console_level) {
        (Some(file_level), console_level) if *file_level > console_level => *file_level,
        (_, console_level) => console_level,
    };
    log::set_boxed_logger(Box::new(BusLogger::new(config)))
        .context("Failed to set global logger")?;
    log::set_max_level(max_level);
    Ok(())
}

/// Convert string to LevelFilter
pub fn parse_log_level(level_str: &str) -> Result<LevelFilter> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        "off" => Ok(LevelFilter::Off),
        _ => Err(anyhow::anyhow!(
            "Invalid log level: {}. Valid levels: error, warn, info, debug, trace, off",
            level_str
        )),
    }
}
