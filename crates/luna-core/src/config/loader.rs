//! Configuration resolution: file, then environment, then validation

use std::path::{Path, PathBuf};

use tracing::debug;

use super::env_loader::apply_process_env;
use super::file_loader::load_from_file;
use super::model::LunaConfig;
use crate::error::LunaResult;

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "luna.toml";

/// Global config file, `~/.luna/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".luna").join("config.toml"))
}

/// Resolve which file to read when none was given explicitly
fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    default_config_path().filter(|p| p.exists())
}

/// Load the effective configuration
///
/// An explicit path that does not exist yields defaults, like a missing
/// discovered file.
pub fn load_config(path: Option<&Path>) -> LunaResult<LunaConfig> {
    let path = path.map(Path::to_path_buf).or_else(discover_config_file);
    let mut config = match &path {
        Some(p) => {
            debug!(path = %p.display(), "Loading configuration file");
            load_from_file(p)?
        }
        None => LunaConfig::default(),
    };
    apply_process_env(&mut config)?;
    config.validate()?;
    Ok(config)
}
