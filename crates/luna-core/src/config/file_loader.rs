//! File-based configuration loading

use crate::config::model::LunaConfig;
use crate::error::{LunaError, LunaResult};
use std::fs;
use std::path::Path;

/// Load configuration from a file
///
/// Supports JSON, TOML, and YAML formats based on file extension.
/// Returns default config if file doesn't exist.
pub fn load_from_file(path: &Path) -> LunaResult<LunaConfig> {
    if !path.exists() {
        return Ok(LunaConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        LunaError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    parse_config(&content, path)
}

fn parse_config(content: &str, path: &Path) -> LunaResult<LunaConfig> {
    let parse_error = |format: &str, e: &dyn std::fmt::Display| {
        LunaError::config_with_context(
            format!("Failed to parse {} config: {}", format, e),
            format!("Deserializing {} configuration from '{}'", format, path.display()),
        )
    };

    match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(content).map_err(|e| parse_error("TOML", &e)),
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(content).map_err(|e| parse_error("YAML", &e))
        }
        _ => serde_json::from_str(content).map_err(|e| parse_error("JSON", &e)),
    }
}
