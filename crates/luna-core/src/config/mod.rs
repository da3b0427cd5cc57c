//! Configuration management for Luna
//!
//! Settings are read from a file (TOML, YAML or JSON, chosen by extension) and
//! then overridden by `LUNA_*` environment variables.

pub mod env_loader;
pub mod file_loader;
pub mod loader;
pub mod logging_config;
pub mod model;

pub use env_loader::{apply_env_overrides, apply_process_env};
pub use file_loader::load_from_file;
pub use loader::{default_config_path, load_config, DEFAULT_CONFIG_FILE};
pub use logging_config::LoggingConfig;
pub use model::{ClusterConfig, LunaConfig, PollingConfig, StorageConfig, TransferConfig};
