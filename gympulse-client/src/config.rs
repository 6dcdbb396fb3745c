//! Configuration loading for the GymPulse client.
//!
//! The file is optional: every field has a default. A path comes from
//! `--config <path>` or `GYMPULSE_CONFIG`; `GYMPULSE_*` variables then override
//! individual fields before validation.

use gympulse_core::{ConfigError, FreshnessConfig};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_PATH_ENV: &str = "GYMPULSE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value in {var}: {value:?}")]
    InvalidOverride { var: &'static str, value: String },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Load, override and validate the configuration for this process.
pub fn load() -> Result<FreshnessConfig, ConfigLoadError> {
    let path = config_path_from_args(std::env::args().skip(1)).or_else(config_path_from_env);
    let mut config = match path {
        Some(path) => from_path(&path)?,
        None => {
            tracing::debug!("No config file given, using defaults");
            FreshnessConfig::default()
        }
    };
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}

/// Parse a TOML file without validating it.
pub fn from_path(path: &Path) -> Result<FreshnessConfig, ConfigLoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded freshness config");
    Ok(config)
}

/// Apply `GYMPULSE_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(
    config: &mut FreshnessConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigLoadError> {
    override_field(&lookup, "GYMPULSE_STALE_WINDOW_MS", &mut config.cache.stale_window_ms)?;
    override_field(&lookup, "GYMPULSE_GC_WINDOW_MS", &mut config.cache.gc_window_ms)?;
    override_field(&lookup, "GYMPULSE_RETRY_COUNT", &mut config.cache.retry.max_retries)?;
    override_field(&lookup, "GYMPULSE_REFETCH_ON_FOCUS", &mut config.cache.refetch_on_window_focus)?;
    override_field(&lookup, "GYMPULSE_REFETCH_ON_RECONNECT", &mut config.cache.refetch_on_reconnect)?;
    override_field(&lookup, "GYMPULSE_REFRESH_ENABLED", &mut config.refresh.enabled)?;
    override_field(&lookup, "GYMPULSE_REFRESH_INTERVAL_MS", &mut config.refresh.interval_ms)?;
    override_field(&lookup, "GYMPULSE_REFRESH_DEBOUNCE_MS", &mut config.refresh.debounce_ms)?;
    override_field(&lookup, "GYMPULSE_NAV_TIMEOUT_MS", &mut config.navigation.timeout_ms)?;
    if let Some(path) = lookup("GYMPULSE_PREFERENCES_PATH") {
        config.preferences.path = Some(PathBuf::from(path));
    }
    Ok(())
}

fn override_field<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    field: &mut T,
) -> Result<(), ConfigLoadError> {
    let Some(raw) = lookup(var) else {
        return Ok(());
    };
    *field = raw
        .trim()
        .parse()
        .map_err(|_| ConfigLoadError::InvalidOverride { var, value: raw.clone() })?;
    tracing::debug!(var, "Applied config override");
    Ok(())
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn test_config_path_from_args() {
        let args = ["--verbose", "--config", "/etc/gympulse.toml"].map(String::from);
        assert_eq!(config_path_from_args(args), Some(PathBuf::from("/etc/gympulse.toml")));

        let args = ["--config=local.toml".to_string()];
        assert_eq!(config_path_from_args(args), Some(PathBuf::from("local.toml")));

        assert_eq!(config_path_from_args(["--config".to_string()]), None);
    }

    #[test]
    fn test_from_path_reads_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[refresh]\ninterval_ms = 60000\n\n[navigation]\ntimeout_ms = 6000").unwrap();

        let config = from_path(file.path()).unwrap();
        assert_eq!(config.refresh.interval_ms, 60_000);
        assert_eq!(config.refresh.debounce_ms, 2_000);
        assert_eq!(config.navigation.timeout_ms, 6_000);
    }

    #[test]
    fn test_from_path_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[refresh]\nperiod = 5").unwrap();
        assert!(matches!(from_path(file.path()), Err(ConfigLoadError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = from_path(Path::new("/nonexistent/gympulse.toml")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Io { .. }));
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = FreshnessConfig::default();
        let lookup = lookup_from(&[
            ("GYMPULSE_REFRESH_INTERVAL_MS", "15000"),
            ("GYMPULSE_REFRESH_ENABLED", "false"),
            ("GYMPULSE_RETRY_COUNT", " 3 "),
            ("GYMPULSE_PREFERENCES_PATH", "/tmp/prefs.json"),
        ]);
        apply_env_overrides(&mut config, lookup).unwrap();

        assert_eq!(config.refresh.interval_ms, 15_000);
        assert!(!config.refresh.enabled);
        assert_eq!(config.cache.retry.max_retries, 3);
        assert_eq!(config.preferences.path, Some(PathBuf::from("/tmp/prefs.json")));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = FreshnessConfig::default();
        let lookup = lookup_from(&[("GYMPULSE_NAV_TIMEOUT_MS", "soon")]);
        let err = apply_env_overrides(&mut config, lookup).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidOverride { var: "GYMPULSE_NAV_TIMEOUT_MS", .. }
        ));
    }
}
