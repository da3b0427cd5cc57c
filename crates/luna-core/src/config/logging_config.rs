//! Logging configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Accepted values for [`LoggingConfig::format`]
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to log to file
    pub log_to_file: bool,
    /// Log file path
    pub log_file: Option<PathBuf>,
    /// Whether to log to console
    pub log_to_console: bool,
    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: None,
            log_to_console: true,
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_valid_format(&self) -> bool {
        LOG_FORMATS.contains(&self.format.as_str())
    }
}
