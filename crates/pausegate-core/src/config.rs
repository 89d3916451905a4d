use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Get the local data directory for pausegate.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("pausegate");
    Ok(path)
}

/// Default location of `config.toml`
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.toml"))
}

/// Engine tunables. Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest absence after which re-entering still continues the same session
    pub tolerance_ms: u64,
    /// Suppression window armed when the user picks Continue
    pub continue_exemption_ms: u64,
    /// Suppression window armed on every recorded exit
    pub debounce_ms: u64,
    /// Countdown length of a pause session
    pub pause_duration_secs: u32,
    /// Package of the app hosting the pause surface; always transient
    pub host_package: String,
    pub extra_transient_packages: Vec<String>,
    pub extra_launcher_prefixes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 5_000,
            continue_exemption_ms: 1_000,
            debounce_ms: 500,
            pause_duration_secs: 15,
            host_package: String::from("app.pausegate"),
            extra_transient_packages: Vec::new(),
            extra_launcher_prefixes: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)?;
        log::info!(
            "Loaded config from {} (tolerance: {}ms)",
            path.display(),
            config.tolerance_ms
        );
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrongly typed fields
    pub fn from_toml(raw: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(raw)?)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn tolerance_ms_i64(&self) -> i64 {
        i64::try_from(self.tolerance_ms).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = EngineConfig::from_toml("tolerance_ms = 300000\n").unwrap();
        assert_eq!(config.tolerance_ms, 300_000);
        assert_eq!(config.continue_exemption_ms, 1_000);
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.host_package, "app.pausegate");
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let err = EngineConfig::from_toml("tolerance_ms = \"soon\"\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = EngineConfig::default();
        config.extra_launcher_prefixes = vec![String::from("org.example.home")];
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
