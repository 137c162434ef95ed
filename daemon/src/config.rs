/// Daemon-side configuration: HTTP bind address and bearer-token auth.
/// Workflow engine configuration (`WorkflowConfig`, `AdapterConfig`, ...) lives in
/// `pinion_core::AppConfig` and is loaded separately by `main`.
use crate::errors::{DaemonError, DaemonResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub http_addr: String,
    pub http_port: u16,
    pub request_timeout_secs: u64,
    pub enable_metrics: bool,
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http_addr: "127.0.0.1".to_string(),
            http_port: 8080,
            request_timeout_secs: 30,
            enable_metrics: true,
            metrics_port: 9090,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
    pub jwt_secret: String,
    pub token_expiry_secs: u64,
    pub api_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            enabled: false,
            jwt_secret: "default-secret-change-in-production".to_string(),
            token_expiry_secs: 3600,
            api_key: None,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &str) -> DaemonResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DaemonError::ConfigError(format!("failed to read config file: {e}")))?;
        toml::from_str(&content).map_err(|e| DaemonError::ConfigError(format!("failed to parse config: {e}")))
    }

    pub fn validate(&self) -> DaemonResult<()> {
        if self.server.http_port == 0 {
            return Err(DaemonError::ConfigError("server.http_port must be non-zero".to_string()));
        }
        if self.auth.enabled && self.auth.jwt_secret == "default-secret-change-in-production" {
            return Err(DaemonError::ConfigError(
                "jwt_secret must be changed from default when auth is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_port_is_invalid() {
        let mut config = DaemonConfig::default();
        config.server.http_port = 0;
        assert!(config.validate().is_err());
    }
}
