//! Runtime configuration.
//!
//! # Invariants
//! - Every key is optional; missing keys take the documented default.
//! - Persistence policy is global configuration, never a per-call switch.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Root directory of the record store.
    pub database_path: PathBuf,
    /// Parent directory of JSON-store backups.
    pub backup_dir: PathBuf,
    /// Store failures abort the operation when true.
    pub strict_persistence: bool,
    /// In permissive mode, store failures are logged at `warn` when true.
    pub warn_persistence: bool,
    /// Load every stored record when the registry starts.
    pub load_all: bool,
    /// Level passed to `init_logging`.
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database"),
            backup_dir: PathBuf::from("backups"),
            strict_persistence: true,
            warn_persistence: true,
            load_all: false,
            log_level: crate::logging::default_log_level().to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Permissive persistence: failures are logged (or not) and ignored.
    pub fn permissive(mut self) -> Self {
        self.strict_persistence = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::RuntimeConfig;
    use std::path::PathBuf;

    #[test]
    fn missing_keys_take_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{"load_all": true}"#).unwrap();
        assert!(config.load_all);
        assert!(config.strict_persistence);
        assert_eq!(config.database_path, PathBuf::from("database"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(RuntimeConfig::from_json_str("{").is_err());
    }
}
