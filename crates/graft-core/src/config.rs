//! Injector configuration

use crate::error::ConfigError;
use crate::settings::InjectionMode;
use graft_plugin::DEFAULT_EXTENSION;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Injector tree configuration
///
/// ```toml
/// default_mode = "explicit"
/// destroy_on_drop = false
///
/// [aggregation]
/// parallel_threshold = 128
///
/// [plugin]
/// artifact_extension = "plugin"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    /// Mode of the root target of `instantiate*` helpers
    pub default_mode: InjectionMode,
    /// Tear down everything the injector built when it is dropped
    pub destroy_on_drop: bool,
    /// Aggregation settings
    pub aggregation: AggregationConfig,
    /// Plugin settings
    pub plugin: PluginConfig,
}

impl InjectorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With root injection mode
    #[inline]
    #[must_use]
    pub fn with_default_mode(mut self, mode: InjectionMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// With teardown on drop
    #[inline]
    #[must_use]
    pub fn with_destroy_on_drop(mut self, enabled: bool) -> Self {
        self.destroy_on_drop = enabled;
        self
    }

    /// With pool size above which aggregation runs in parallel
    #[inline]
    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.aggregation.parallel_threshold = threshold;
        self
    }

    /// With plugin artifact extension
    #[inline]
    #[must_use]
    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.plugin.artifact_extension = extension.into();
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` for malformed TOML
    /// - `ConfigError::Invalid` for out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as [`Self::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation.parallel_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "aggregation.parallel_threshold",
                reason: "must be at least 1".into(),
            });
        }
        let extension = &self.plugin.artifact_extension;
        if extension.is_empty() || extension.contains(['.', '/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "plugin.artifact_extension",
                reason: format!("'{extension}' is not a bare file extension"),
            });
        }
        Ok(())
    }
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            default_mode: InjectionMode::Eager,
            destroy_on_drop: true,
            aggregation: AggregationConfig::default(),
            plugin: PluginConfig::default(),
        }
    }
}

/// Aggregation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Pool size above which candidates are filtered on the rayon pool
    pub parallel_threshold: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 64,
        }
    }
}

/// Plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Extension of plugin artifacts, without the dot
    pub artifact_extension: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            artifact_extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = InjectorConfig::new();
        assert_eq!(config.default_mode, InjectionMode::Eager);
        assert!(config.destroy_on_drop);
        assert_eq!(config.aggregation.parallel_threshold, 64);
        assert_eq!(config.plugin.artifact_extension, "jar");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = InjectorConfig::from_toml_str(
            r#"
            default_mode = "explicit"

            [plugin]
            artifact_extension = "plugin"
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            InjectorConfig::new()
                .with_default_mode(InjectionMode::Explicit)
                .with_artifact_extension("plugin")
        );
    }

    #[test]
    fn invalid_values() {
        let err = InjectorConfig::from_toml_str("[aggregation]\nparallel_threshold = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "aggregation.parallel_threshold",
                ..
            }
        ));

        let err = InjectorConfig::new().with_artifact_extension(".jar").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "plugin.artifact_extension", .. }));

        assert!(matches!(
            InjectorConfig::from_toml_str("default_mode = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.toml");
        std::fs::write(&path, "destroy_on_drop = false").unwrap();

        assert!(!InjectorConfig::from_file(&path).unwrap().destroy_on_drop);
        assert!(matches!(
            InjectorConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
