//! Environment variable-based configuration overrides

use std::path::PathBuf;

use crate::config::model::LunaConfig;
use crate::error::{LunaError, LunaResult};

/// Apply `LUNA_*` overrides (and `CI`) from the process environment
pub fn apply_process_env(config: &mut LunaConfig) -> LunaResult<()> {
    apply_env_overrides(config, std::env::vars())
}

/// Apply overrides from an explicit set of variables
///
/// Recognized: `LUNA_NAMESPACE`, `LUNA_HELPER_IMAGE`, `LUNA_STORAGE_ROOT`,
/// `LUNA_LOG_LEVEL`, `LUNA_LOG_FORMAT`, `LUNA_POLL_DEADLINE` and `CI`.
/// Everything else is ignored.
pub fn apply_env_overrides<I, K, V>(config: &mut LunaConfig, vars: I) -> LunaResult<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    for (key, value) in vars {
        let value: String = value.into();
        match key.as_ref() {
            "LUNA_NAMESPACE" => config.cluster.namespace = value,
            "LUNA_HELPER_IMAGE" => config.cluster.helper_image = value,
            "LUNA_STORAGE_ROOT" => config.storage.root = PathBuf::from(value),
            "LUNA_LOG_LEVEL" => config.logging.level = value,
            "LUNA_LOG_FORMAT" => config.logging.format = value,
            "LUNA_POLL_DEADLINE" => {
                let deadline = humantime_serde::re::humantime::parse_duration(&value).map_err(|e| {
                    LunaError::config_with_context(
                        format!("Invalid LUNA_POLL_DEADLINE value: {}", e),
                        format!("Parsing deadline '{}'", value),
                    )
                })?;
                config.polling.deadline = Some(deadline);
            }
            "CI" => config.cluster.ci = value,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_overrides() {
        let mut config = LunaConfig::default();
        apply_env_overrides(
            &mut config,
            [
                ("LUNA_NAMESPACE", "eval"),
                ("LUNA_STORAGE_ROOT", "/data/luna"),
                ("LUNA_LOG_FORMAT", "compact"),
                ("LUNA_POLL_DEADLINE", "90s"),
                ("CI", "true"),
                ("PATH", "/usr/bin"),
            ],
        )
        .unwrap();

        assert_eq!(config.cluster.namespace, "eval");
        assert_eq!(config.storage.root, PathBuf::from("/data/luna"));
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.polling.deadline, Some(Duration::from_secs(90)));
        assert_eq!(config.cluster.ci, "true");
    }

    #[test]
    fn test_invalid_deadline() {
        let mut config = LunaConfig::default();
        let result = apply_env_overrides(&mut config, [("LUNA_POLL_DEADLINE", "soon")]);
        assert!(result.is_err());
        assert_eq!(config.polling.deadline, None);
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let mut config = LunaConfig::default();
        apply_env_overrides(&mut config, Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config, LunaConfig::default());
    }
}
