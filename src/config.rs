use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coverage::ShiftPolicy;

/// Application-level constants
pub const APP_NAME: &str = "MedTrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the optional engine configuration inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_GRACE_MINUTES: u32 = 120;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_HORIZON_DAYS: u32 = 7;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8321";

/// Get the application data directory
/// ~/MedTrack/ on all platforms, falling back to the working directory when
/// no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default database location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("medtrack.db")
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medtrack_lib=info,medtrack=info,tower_http=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Minutes after a window closes during which a mark counts as LATE.
    pub grace_minutes: u32,
    pub sweep_interval_secs: u64,
    /// Days past today for which dose instances are kept materialized.
    pub schedule_horizon_days: u32,
    pub bind_addr: String,
    /// Defaults to [`default_db_path`].
    pub db_path: Option<PathBuf>,
    pub shift_policy: ShiftPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_minutes: DEFAULT_GRACE_MINUTES,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            schedule_horizon_days: DEFAULT_HORIZON_DAYS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            db_path: None,
            shift_policy: ShiftPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load `<app_data_dir>/config.json` if present, then apply `MEDTRACK_*`
    /// environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = app_data_dir().join(CONFIG_FILE_NAME);
        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    pub fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };

        if let Some(v) = env("MEDTRACK_GRACE_MINUTES") {
            config.grace_minutes = parse_env("MEDTRACK_GRACE_MINUTES", v)?;
        }
        if let Some(v) = env("MEDTRACK_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = parse_env("MEDTRACK_SWEEP_INTERVAL_SECS", v)?;
        }
        if let Some(v) = env("MEDTRACK_BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = env("MEDTRACK_DB_PATH") {
            config.db_path = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_minutes > 24 * 60 {
            return Err(ConfigError::Invalid(format!(
                "graceMinutes {} exceeds one day",
                self.grace_minutes
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweepIntervalSecs must be positive".into()));
        }
        if !(1..=366).contains(&self.schedule_horizon_days) {
            return Err(ConfigError::Invalid(format!(
                "scheduleHorizonDays {} must be between 1 and 366",
                self.schedule_horizon_days
            )));
        }
        self.socket_addr()?;
        self.shift_policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn grace(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.grace_minutes))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bindAddr '{}' is not host:port", self.bind_addr)))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("MedTrack"));
        assert!(default_db_path().starts_with(app_data_dir()));
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grace(), chrono::Duration::minutes(120));
        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(config.socket_addr().unwrap().port(), 8321);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("config.json"), no_env).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn file_values_and_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"graceMinutes": 60, "scheduleHorizonDays": 14}"#).unwrap();

        let env: HashMap<&str, &str> = [
            ("MEDTRACK_SWEEP_INTERVAL_SECS", "30"),
            ("MEDTRACK_DB_PATH", "/tmp/medtrack-test.db"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::load_from(&path, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.grace_minutes, 60);
        assert_eq!(config.schedule_horizon_days, 14);
        assert_eq!(config.sweep_interval_secs, 30);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/medtrack-test.db"));
        assert_eq!(config.shift_policy, ShiftPolicy::default());
    }

    #[test]
    fn malformed_env_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load_from(&dir.path().join("config.json"), |k| {
            (k == "MEDTRACK_GRACE_MINUTES").then(|| "two hours".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "MEDTRACK_GRACE_MINUTES", .. }));
    }

    #[test]
    fn invalid_shift_policy_rejected() {
        let mut config = EngineConfig::default();
        config.shift_policy.bands.pop();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_bind_addr_rejected() {
        let config = EngineConfig {
            bind_addr: "localhost".into(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
