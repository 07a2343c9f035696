use std::path::{Path, PathBuf};

use serde::Deserialize;
use shapeworker_core::lifecycle::DEFAULT_EVICTION_THRESHOLD;
use shapeworker_kernel::DEFAULT_PRECISION;

use crate::error::ProxyError;
use crate::service::ServiceOptions;

const CONFIG_FILE: &str = "shapeworker.toml";

#[derive(Debug, Default, Deserialize)]
pub struct ShapeworkerConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Usage count above which a run start evicts the whole cache.
    #[serde(default = "default_eviction_threshold")]
    pub eviction_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction_threshold: default_eviction_threshold(),
        }
    }
}

fn default_eviction_threshold() -> usize {
    DEFAULT_EVICTION_THRESHOLD
}

#[derive(Debug, Deserialize)]
pub struct MeshConfig {
    /// Chord tolerance used when a mesh request gives no precision.
    #[serde(default = "default_precision")]
    pub default_precision: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            default_precision: default_precision(),
        }
    }
}

fn default_precision() -> f64 {
    DEFAULT_PRECISION
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ShapeworkerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ProxyError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ProxyError::ConfigError(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the first config file found on the
    /// search path, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ProxyError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match search_paths().into_iter().find(|p| p.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config");
                Self::from_file(&path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<(), ProxyError> {
        let precision = self.mesh.default_precision;
        if !(precision.is_finite() && precision > 0.0) {
            return Err(ProxyError::ConfigError(format!(
                "mesh.default_precision must be positive, got {precision}"
            )));
        }
        Ok(())
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            eviction_threshold: self.cache.eviction_threshold,
        }
    }
}

/// `./shapeworker.toml`, then `<config dir>/shapeworker/shapeworker.toml`.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("shapeworker").join(CONFIG_FILE));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ShapeworkerConfig = toml::from_str("").unwrap();
        assert_eq!(config.cache.eviction_threshold, 10_000);
        assert_eq!(config.mesh.default_precision, DEFAULT_PRECISION);
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
[cache]
eviction_threshold = 250

[mesh]
default_precision = 0.5

[log]
format = "json"
"#;
        let config: ShapeworkerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache.eviction_threshold, 250);
        assert_eq!(config.mesh.default_precision, 0.5);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.service_options().eviction_threshold, 250);
    }

    #[test]
    fn from_file_rejects_bad_precision() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mesh]\ndefault_precision = 0.0").unwrap();

        let err = ShapeworkerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigError(_)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShapeworkerConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
