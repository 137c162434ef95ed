//! Configuration management for the orchestration daemon.
//! Handles loading, parsing, validation and environment overrides of
//! `.pinion/config.toml`.
use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Top-level configuration for the orchestration system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,

    /// "development", "staging" or "production" — gates which adapters are mocked.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub workflows: WorkflowConfig,

    #[serde(default)]
    pub adapters: AdapterConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            environment: default_environment(),
            workflows: WorkflowConfig::default(),
            adapters: AdapterConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

/// Workflow engine behavior: persistence, retention and sweeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Root directory for snapshot files, one JSON document per workflow.
    #[serde(default = "default_data_root")]
    pub data_root: String,

    /// Whether completed/failed workflow state is written to disk at all.
    #[serde(default = "default_true")]
    pub enable_persistence: bool,

    /// Background disk-flush cadence in seconds.
    #[serde(default = "default_flush_interval")]
    pub snapshot_flush_interval_secs: u64,

    /// In-memory retention of a workflow after it stops changing.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// How often the TTL sweeper runs.
    #[serde(default = "default_sweep_period")]
    pub sweep_period_secs: u64,

    /// Auto-retry budget before a release-pipeline failure is terminal.
    #[serde(default = "default_max_error_retries")]
    pub max_error_retries: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            enable_persistence: true,
            snapshot_flush_interval_secs: default_flush_interval(),
            ttl_hours: default_ttl_hours(),
            sweep_period_secs: default_sweep_period(),
            max_error_retries: default_max_error_retries(),
        }
    }
}

fn default_data_root() -> String {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".pinion/workflows").to_string_lossy().into_owned()
}

fn default_flush_interval() -> u64 {
    30
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_sweep_period() -> u64 {
    3600
}

fn default_max_error_retries() -> u32 {
    3
}

/// External-system adapter configuration (issue tracker / source forge / wiki).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Use deterministic mock adapters instead of live HTTP clients.
    #[serde(default = "default_true")]
    pub use_mock_apis: bool,

    #[serde(default)]
    pub issue_tracker: ServiceEndpoint,

    #[serde(default)]
    pub source_forge: ServiceEndpoint,

    #[serde(default)]
    pub wiki: ServiceEndpoint,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            use_mock_apis: true,
            issue_tracker: ServiceEndpoint::default(),
            source_forge: ServiceEndpoint::default(),
            wiki: ServiceEndpoint::default(),
        }
    }
}

/// A single external-service endpoint with optional credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceEndpoint {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

/// Classifier / chat LLM backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_classifier_confidence")]
    pub fallback_confidence: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_timeout(),
            fallback_confidence: default_classifier_confidence(),
        }
    }
}

fn default_llm_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_classifier_confidence() -> f32 {
    0.7
}

/// HTTP/streaming server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Logging and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Loads, validates and persists [`AppConfig`].
pub struct ConfigManager {
    config: AppConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file, falling back to defaults if absent.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let path = if let Some(p) = config_path {
            p.to_path_buf()
        } else if let Some(home) = dirs::home_dir() {
            let default_path = home.join(".pinion/config.toml");
            if default_path.exists() {
                default_path
            } else {
                PathBuf::from(".pinion/config.toml")
            }
        } else {
            PathBuf::from(".pinion/config.toml")
        };

        let mut config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?
        } else {
            warn!("Config file not found at {:?}, using defaults", path);
            AppConfig::default()
        };

        Self::apply_env_overrides(&mut config);
        debug!("Configuration loaded successfully");
        Ok(ConfigManager {
            config,
            config_path: path,
        })
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(env) = std::env::var("PINION_ENVIRONMENT") {
            config.environment = env;
        }
        if let Ok(val) = std::env::var("PINION_USE_MOCK_APIS") {
            config.adapters.use_mock_apis = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(root) = std::env::var("PINION_DATA_ROOT") {
            config.workflows.data_root = root;
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(token) = std::env::var("JIRA_API_TOKEN") {
            config.adapters.issue_tracker.api_token = Some(token);
        }
        if let Ok(token) = std::env::var("GITHUB_API_TOKEN") {
            config.adapters.source_forge.api_token = Some(token);
        }
        if let Ok(token) = std::env::var("CONFLUENCE_API_TOKEN") {
            config.adapters.wiki.api_token = Some(token);
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn save(&self) -> ConfigResult<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        std::fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        info!("Configuration saved to {:?}", self.config_path);
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.config.workflows.ttl_hours == 0 {
            return Err(ConfigError::Invalid(
                "workflows.ttl_hours must be greater than 0".to_string(),
            ));
        }
        if self.config.workflows.max_error_retries == 0 {
            return Err(ConfigError::Invalid(
                "workflows.max_error_retries must be greater than 0".to_string(),
            ));
        }
        debug!("Configuration validation passed");
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = AppConfig::default();
        assert_eq!(config.environment, "development");
        assert!(config.adapters.use_mock_apis);
        assert_eq!(config.workflows.ttl_hours, 24);
    }

    #[test]
    fn validation_rejects_zero_ttl() {
        let mut config = AppConfig::default();
        config.workflows.ttl_hours = 0;
        let manager = ConfigManager {
            config,
            config_path: PathBuf::from("/tmp/pinion-test-config.toml"),
        };
        assert!(manager.validate().is_err());
    }
}
