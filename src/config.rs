//! Process configuration, read once from the environment at startup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::crypto::KdfParams;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("no data directory: set LUNA_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("expected pretty, compact or json, got {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive for this crate, e.g. `info` or `debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub logging: LoggingConfig,
    pub kdf: KdfParams,
}

impl Config {
    /// Load from `LUNA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match lookup("LUNA_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("luna"),
        };

        let defaults = KdfParams::default();
        let kdf = KdfParams {
            memory_kib: parse_or(&lookup, "LUNA_KDF_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&lookup, "LUNA_KDF_ITERATIONS", defaults.iterations)?,
        };
        if kdf.memory_kib < 8 || kdf.iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "LUNA_KDF_MEMORY_KIB",
                value: format!("{}/{}", kdf.memory_kib, kdf.iterations),
                reason: "memory must be at least 8 KiB and iterations at least 1".into(),
            });
        }

        let logging = LoggingConfig {
            level: lookup("LUNA_LOG_LEVEL").unwrap_or_else(|| "info".into()),
            format: parse_or(&lookup, "LUNA_LOG_FORMAT", LogFormat::Pretty)?,
        };

        Ok(Self {
            data_dir,
            logging,
            kdf,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
