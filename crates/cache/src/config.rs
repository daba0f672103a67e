//! Cache configuration: preview bound, memory budget, eviction mode.
//!
//! Configuration can be loaded from a file, from environment variables, or
//! created programmatically with the builder methods.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Which shipped eviction policy the store is built with.
///
/// Custom policies bypass this knob entirely; see
/// [`crate::store::ImageStore::with_parts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionMode {
    /// Keep everything warm until `clear`.
    RetainAll,
    /// Reclaim records as soon as their last outside holder lets go.
    Immediate,
    /// Reclaim unreferenced records only while over the memory budget.
    Budget,
}

impl EvictionMode {
    fn as_str(&self) -> &'static str {
        match self {
            EvictionMode::RetainAll => "retain",
            EvictionMode::Immediate => "immediate",
            EvictionMode::Budget => "budget",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "retain" => Some(EvictionMode::RetainAll),
            "immediate" => Some(EvictionMode::Immediate),
            "budget" => Some(EvictionMode::Budget),
            _ => None,
        }
    }
}

/// Configuration for the image cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Longest side of a preview in pixels.
    pub preview_max_px: u32,
    /// Memory budget in bytes, consulted by the Budget eviction mode.
    pub memory_budget: usize,
    /// Eviction decision applied when a record becomes unreferenced.
    pub eviction: EvictionMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            preview_max_px: 512,
            memory_budget: 256 * 1024 * 1024, // 256 MB
            eviction: EvictionMode::Budget,
        }
    }
}

impl CacheConfig {
    /// Sets the preview bound in pixels.
    pub fn with_preview_max_px(mut self, px: u32) -> Self {
        self.preview_max_px = px;
        self
    }

    /// Sets the memory budget in megabytes.
    pub fn with_budget_mb(mut self, mb: usize) -> Self {
        self.memory_budget = mb * 1024 * 1024;
        self
    }

    /// Sets the eviction mode.
    pub fn with_eviction(mut self, eviction: EvictionMode) -> Self {
        self.eviction = eviction;
        self
    }

    /// Returns the memory budget in megabytes.
    pub fn budget_mb(&self) -> usize {
        self.memory_budget / (1024 * 1024)
    }

    /// Returns the default configuration file path for the current
    /// platform, e.g. `~/.config/pano-editor/cache.toml` on Linux.
    pub fn default_config_file() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pano-editor").join("cache.toml")
        } else {
            // Fallback to the working directory if no config dir exists
            PathBuf::from("pano-editor-cache.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PANO_EDITOR_PREVIEW_MAX_PX`: preview bound in pixels (default: 512)
    /// - `PANO_EDITOR_CACHE_BUDGET_MB`: memory budget in MB (default: 256)
    /// - `PANO_EDITOR_CACHE_EVICTION`: `retain`, `immediate`, or `budget`
    ///
    /// # Errors
    /// Returns an error if any variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PANO_EDITOR_PREVIEW_MAX_PX") {
            config.preview_max_px = val
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidValue("PANO_EDITOR_PREVIEW_MAX_PX".to_string()))?;
        }

        if let Ok(val) = std::env::var("PANO_EDITOR_CACHE_BUDGET_MB") {
            config.memory_budget = val
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("PANO_EDITOR_CACHE_BUDGET_MB".to_string()))?
                * 1024
                * 1024;
        }

        if let Ok(val) = std::env::var("PANO_EDITOR_CACHE_EVICTION") {
            config.eviction = EvictionMode::parse(&val).ok_or_else(|| {
                ConfigError::InvalidValue("PANO_EDITOR_CACHE_EVICTION".to_string())
            })?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// preview_max_px = 512
    /// cache_budget_mb = 256
    /// eviction = "budget"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "preview_max_px" => {
                        config.preview_max_px = value
                            .parse::<u32>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
                    }
                    "cache_budget_mb" => {
                        config.memory_budget = value
                            .parse::<usize>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?
                            * 1024
                            * 1024;
                    }
                    "eviction" => {
                        config.eviction = EvictionMode::parse(value)
                            .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))?;
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml())?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    fn to_toml(&self) -> String {
        format!(
            "# Pano Editor Image Cache Configuration\n\
             preview_max_px = {}\n\
             cache_budget_mb = {}\n\
             eviction = \"{}\"\n",
            self.preview_max_px,
            self.budget_mb(),
            self.eviction.as_str()
        )
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing the configuration file
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.preview_max_px, 512);
        assert_eq!(config.memory_budget, 256 * 1024 * 1024);
        assert_eq!(config.eviction, EvictionMode::Budget);
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_preview_max_px(256)
            .with_budget_mb(64)
            .with_eviction(EvictionMode::Immediate);

        assert_eq!(config.preview_max_px, 256);
        assert_eq!(config.memory_budget, 64 * 1024 * 1024);
        assert_eq!(config.eviction, EvictionMode::Immediate);
        assert_eq!(config.budget_mb(), 64);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&[
            "PANO_EDITOR_PREVIEW_MAX_PX",
            "PANO_EDITOR_CACHE_BUDGET_MB",
            "PANO_EDITOR_CACHE_EVICTION",
        ]);

        env::set_var("PANO_EDITOR_PREVIEW_MAX_PX", "128");
        env::set_var("PANO_EDITOR_CACHE_BUDGET_MB", "32");
        env::set_var("PANO_EDITOR_CACHE_EVICTION", "retain");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.preview_max_px, 128);
        assert_eq!(config.memory_budget, 32 * 1024 * 1024);
        assert_eq!(config.eviction, EvictionMode::RetainAll);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&[
            "PANO_EDITOR_PREVIEW_MAX_PX",
            "PANO_EDITOR_CACHE_BUDGET_MB",
            "PANO_EDITOR_CACHE_EVICTION",
        ]);

        env::remove_var("PANO_EDITOR_CACHE_BUDGET_MB");
        env::remove_var("PANO_EDITOR_CACHE_EVICTION");
        env::set_var("PANO_EDITOR_PREVIEW_MAX_PX", "200");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.preview_max_px, 200);
        assert_eq!(config.memory_budget, 256 * 1024 * 1024); // default
        assert_eq!(config.eviction, EvictionMode::Budget); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&["PANO_EDITOR_CACHE_BUDGET_MB"]);

        env::set_var("PANO_EDITOR_CACHE_BUDGET_MB", "not_a_number");
        assert!(CacheConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_eviction_mode() {
        let _guard = EnvGuard::new(&["PANO_EDITOR_CACHE_EVICTION"]);

        env::set_var("PANO_EDITOR_CACHE_EVICTION", "sometimes");
        assert!(CacheConfig::from_env().is_err());
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars =
                var_names.iter().map(|name| (name.to_string(), env::var(name).ok())).collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CacheConfig::default()
            .with_preview_max_px(300)
            .with_budget_mb(128)
            .with_eviction(EvictionMode::RetainAll);
        let parsed = CacheConfig::from_toml(&config.to_toml()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_from_toml_ignores_comments_and_unknown_keys() {
        let toml = "# comment\npreview_max_px = 100\nfuture_knob = 7\n";
        let config = CacheConfig::from_toml(toml).unwrap();
        assert_eq!(config.preview_max_px, 100);
        assert_eq!(config.memory_budget, 256 * 1024 * 1024);
    }

    #[test]
    fn test_from_toml_invalid_value() {
        assert!(CacheConfig::from_toml("preview_max_px = huge\n").is_err());
        assert!(CacheConfig::from_toml("eviction = \"sometimes\"\n").is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = std::env::temp_dir().join("pano-editor-cache-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cache.toml");

        let config = CacheConfig::default().with_budget_mb(48);
        config.save_to_file(&path).unwrap();
        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_file_missing() {
        assert!(CacheConfig::from_file("definitely/not/here.toml").is_err());
    }
}
