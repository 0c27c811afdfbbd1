use std::net::SocketAddr;

use brandlens::gateway::{GatewayConfig, ModelEndpoint};
use config::{Config, Environment};
use serde::Deserialize;

use crate::error::{to_env_var, ConfigError};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Failed to parse socket address")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub api_key: String,
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_insights_model")]
    pub insights_model: String,
}

impl GatewaySettings {
    /// The immutable alias table handed to the gateway. The online alias
    /// rides a distinct bots endpoint on the same host.
    pub fn gateway_config(&self) -> GatewayConfig {
        let host = self.host.trim_end_matches('/');
        GatewayConfig::new(self.api_key.clone(), self.default_model.clone())
            .with_alias(
                "deepseek-v3",
                ModelEndpoint::new("deepseek-v3-250324", host),
            )
            .with_alias(
                "deepseek-v3-online",
                ModelEndpoint::new("bot-20250321210824-76l48", format!("{}/bots", host)),
            )
            .with_alias(
                "doubao-lite",
                ModelEndpoint::new("doubao-1-5-lite-32k-250115", host),
            )
    }
}

/// Declared processing deadlines. Currently configuration-only: no endpoint
/// enforces them.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_user_query_secs")]
    pub user_query_secs: u64,
    #[serde(default = "default_server_query_secs")]
    pub server_query_secs: u64,
    #[serde(default = "default_data_processing_secs")]
    pub data_processing_secs: u64,
    #[serde(default = "default_interrupt_secs")]
    pub interrupt_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        TimeoutSettings {
            user_query_secs: default_user_query_secs(),
            server_query_secs: default_server_query_secs(),
            data_processing_secs: default_data_processing_secs(),
            interrupt_secs: default_interrupt_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default = "default_runs_dir")]
    pub runs_dir: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("gateway.host", default_gateway_host())?
            .set_default("gateway.default_model", default_model())?
            .set_default("gateway.insights_model", default_insights_model())?
            .set_default("runs_dir", default_runs_dir())?
            .add_source(
                Environment::with_prefix("BRANDLENS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_gateway_host() -> String {
    "https://ark.cn-beijing.volces.com/api/v3".to_string()
}

fn default_model() -> String {
    "deepseek-v3".to_string()
}

fn default_insights_model() -> String {
    "doubao-lite".to_string()
}

fn default_user_query_secs() -> u64 {
    60
}

fn default_server_query_secs() -> u64 {
    600
}

fn default_data_processing_secs() -> u64 {
    30
}

fn default_interrupt_secs() -> u64 {
    5
}

fn default_runs_dir() -> String {
    "data/server_runs".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("BRANDLENS_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("BRANDLENS_GATEWAY__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8001);
        assert_eq!(settings.gateway.api_key, "test-key");
        assert_eq!(settings.gateway.default_model, "deepseek-v3");
        assert_eq!(settings.timeouts.user_query_secs, 60);
        assert_eq!(settings.timeouts.server_query_secs, 600);
        assert_eq!(settings.runs_dir, "data/server_runs");

        env::remove_var("BRANDLENS_GATEWAY__API_KEY");
    }

    #[test]
    #[serial]
    fn test_missing_api_key_reports_env_var() {
        clean_env();
        let err = Settings::new().unwrap_err();
        match err {
            ConfigError::MissingEnvVar { env_var } => {
                assert!(env_var.contains("API_KEY"), "got {}", env_var);
            }
            other => panic!("expected MissingEnvVar, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("BRANDLENS_GATEWAY__API_KEY", "k");
        env::set_var("BRANDLENS_SERVER__PORT", "9002");
        env::set_var("BRANDLENS_GATEWAY__HOST", "http://localhost:1234/api/v3");
        env::set_var("BRANDLENS_RUNS_DIR", "/tmp/runs");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 9002);
        assert_eq!(settings.gateway.host, "http://localhost:1234/api/v3");
        assert_eq!(settings.runs_dir, "/tmp/runs");

        env::remove_var("BRANDLENS_GATEWAY__API_KEY");
        env::remove_var("BRANDLENS_SERVER__PORT");
        env::remove_var("BRANDLENS_GATEWAY__HOST");
        env::remove_var("BRANDLENS_RUNS_DIR");
    }

    #[test]
    #[serial]
    fn test_alias_table_routes_online_model_to_bots() {
        clean_env();
        let gateway = GatewaySettings {
            api_key: "k".to_string(),
            host: "http://h/api/v3/".to_string(),
            default_model: default_model(),
            insights_model: default_insights_model(),
        };
        let config = gateway.gateway_config();
        let online = config.resolve(Some("deepseek-v3-online")).unwrap();
        assert_eq!(online.base_url, "http://h/api/v3/bots");
        let default = config.resolve(None).unwrap();
        assert_eq!(default.id, "deepseek-v3-250324");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 8001,
        };
        assert_eq!(server_settings.socket_addr().to_string(), "127.0.0.1:8001");
    }
}
