//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/soundtrack/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/soundtrack/` (~/.config/soundtrack/)
//! - State/Logs: `$XDG_STATE_HOME/soundtrack/` (~/.local/state/soundtrack/)
//!
//! The backend base URL can also be supplied through the process environment
//! as `SOUNDTRACK_BACKEND_URL`, which wins over the file.

use crate::error::{Error, Result};
use crate::types::MediaType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`PipelineConfig::base_url`]
pub const BACKEND_URL_ENV: &str = "SOUNDTRACK_BACKEND_URL";

/// Local development backend
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Stage endpoints, timeouts and filters
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Everything the dispatcher and executor need, injected at construction.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Base URL shared by both stage endpoints
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the analysis stage, relative to `base_url`
    #[serde(default = "default_analysis_path")]
    pub analysis_path: String,

    /// Path of the recommendation stage, relative to `base_url`
    #[serde(default = "default_recommendation_path")]
    pub recommendation_path: String,

    /// Hard upper bound for an analysis call
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_ms: u64,

    /// Hard upper bound for a recommendation call
    #[serde(default = "default_recommendation_timeout")]
    pub recommendation_timeout_ms: u64,

    /// Content-type prefixes that are sent to analysis
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,

    /// Public host used to build storage URLs from bucket + object name
    #[serde(default = "default_storage_host")]
    pub storage_host: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            analysis_path: default_analysis_path(),
            recommendation_path: default_recommendation_path(),
            analysis_timeout_ms: default_analysis_timeout(),
            recommendation_timeout_ms: default_recommendation_timeout(),
            allowed_content_types: default_allowed_content_types(),
            storage_host: default_storage_host(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_analysis_path() -> String {
    "/api/media/analyze-new".to_string()
}

fn default_recommendation_path() -> String {
    "/api/media/recommend-song".to_string()
}

fn default_analysis_timeout() -> u64 {
    60_000
}

fn default_recommendation_timeout() -> u64 {
    30_000
}

fn default_allowed_content_types() -> Vec<String> {
    vec!["image/".to_string()]
}

fn default_storage_host() -> String {
    "https://storage.googleapis.com".to_string()
}

impl PipelineConfig {
    /// Config pointing both stages at `base_url`, defaults elsewhere
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(Error::Config("pipeline.base_url is required".to_string()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::Config(format!(
                "pipeline.base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.analysis_timeout_ms == 0 || self.recommendation_timeout_ms == 0 {
            return Err(Error::Config(
                "pipeline timeouts must be greater than zero".to_string(),
            ));
        }
        if self.allowed_content_types.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::Config(
                "pipeline.allowed_content_types must not contain empty entries".to_string(),
            ));
        }
        if let Some(prefix) = self
            .allowed_content_types
            .iter()
            .find(|p| MediaType::from_content_type(p).is_none())
        {
            return Err(Error::Config(format!(
                "pipeline.allowed_content_types entry {:?} is neither image/ nor video/",
                prefix
            )));
        }
        Ok(())
    }

    /// Full URL of the analysis stage
    pub fn analysis_endpoint(&self) -> String {
        join_url(&self.base_url, &self.analysis_path)
    }

    /// Full URL of the recommendation stage, without query string
    pub fn recommendation_endpoint(&self) -> String {
        join_url(&self.base_url, &self.recommendation_path)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn recommendation_timeout(&self) -> Duration {
        Duration::from_millis(self.recommendation_timeout_ms)
    }

    /// Public URL of an uploaded object
    pub fn storage_url(&self, bucket: &str, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.storage_host.trim_end_matches('/'),
            bucket,
            name
        )
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write human-readable logs to stderr
    #[serde(default)]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            stderr: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path, then apply the environment
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env();
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply process-level overrides
    pub fn apply_env(&mut self) {
        self.apply_backend_url(std::env::var(BACKEND_URL_ENV).ok());
    }

    fn apply_backend_url(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|v| !v.trim().is_empty()) {
            self.pipeline.base_url = url.trim().to_string();
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/soundtrack/config.toml` (~/.config/soundtrack/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("soundtrack").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/soundtrack/` (~/.local/state/soundtrack/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("soundtrack")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.base_url, "http://localhost:8000");
        assert_eq!(config.pipeline.analysis_timeout_ms, 60_000);
        assert_eq!(config.pipeline.recommendation_timeout_ms, 30_000);
        assert_eq!(config.pipeline.allowed_content_types, vec!["image/"]);
        assert_eq!(config.logging.level, "info");
        assert!(config.pipeline.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[pipeline]
base_url = "https://backend.example.com/"
recommendation_timeout_ms = 5000

[logging]
level = "debug"
stderr = true
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.pipeline.base_url, "https://backend.example.com/");
        assert_eq!(config.pipeline.recommendation_timeout_ms, 5000);
        // untouched keys keep their defaults
        assert_eq!(config.pipeline.analysis_timeout_ms, 60_000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.stderr);
    }

    #[test]
    fn test_endpoints_join_cleanly() {
        let config = PipelineConfig::with_base_url("https://backend.example.com/");
        assert_eq!(
            config.analysis_endpoint(),
            "https://backend.example.com/api/media/analyze-new"
        );
        assert_eq!(
            config.recommendation_endpoint(),
            "https://backend.example.com/api/media/recommend-song"
        );
        assert_eq!(
            config.storage_url("b", "p.png"),
            "https://storage.googleapis.com/b/p.png"
        );
    }

    #[test]
    fn test_pipeline_config_validation() {
        assert!(PipelineConfig::with_base_url("").validate().is_err());
        assert!(PipelineConfig::with_base_url("ftp://x").validate().is_err());

        let config = PipelineConfig {
            analysis_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            allowed_content_types: vec!["image/".into(), " ".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            allowed_content_types: vec!["image/".into(), "audio/".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            allowed_content_types: vec!["image/png".into(), "video/".into()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_url_override() {
        let mut config = Config::default();
        config.apply_backend_url(Some("  ".to_string()));
        assert_eq!(config.pipeline.base_url, DEFAULT_BASE_URL);

        config.apply_backend_url(Some("http://10.0.0.5:8000".to_string()));
        assert_eq!(config.pipeline.base_url, "http://10.0.0.5:8000");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nanalysis_timeout_ms = 1234\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pipeline.analysis_timeout_ms, 1234);

        std::fs::write(&path, "[pipeline\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
