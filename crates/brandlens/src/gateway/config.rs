use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::GatewayError;

/// Where a model alias actually lands: the backend model identifier and the
/// base URL serving it. Some deployments route through a distinct endpoint,
/// so the URL is per-alias rather than global.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelEndpoint {
    pub id: String,
    pub base_url: String,
}

impl ModelEndpoint {
    pub fn new<I: Into<String>, U: Into<String>>(id: I, base_url: U) -> Self {
        ModelEndpoint {
            id: id.into(),
            base_url: base_url.into(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Immutable gateway configuration, constructed once at startup and passed
/// into the gateway by value. Alias resolution happens per call against this
/// table; there is no ambient lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub api_key: String,
    /// Alias selected when a request does not name a model.
    pub default_model: String,
    pub aliases: HashMap<String, ModelEndpoint>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl GatewayConfig {
    pub fn new<K: Into<String>, M: Into<String>>(api_key: K, default_model: M) -> Self {
        GatewayConfig {
            api_key: api_key.into(),
            default_model: default_model.into(),
            aliases: HashMap::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_alias<A: Into<String>>(mut self, alias: A, endpoint: ModelEndpoint) -> Self {
        self.aliases.insert(alias.into(), endpoint);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve an alias to its endpoint. `None` selects the default model;
    /// an alias missing from the table is a configuration error, not a
    /// silent fallback.
    pub fn resolve(&self, alias: Option<&str>) -> Result<&ModelEndpoint, GatewayError> {
        let alias = alias.unwrap_or(&self.default_model);
        self.aliases
            .get(alias)
            .ok_or_else(|| GatewayError::UnknownModel(alias.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GatewayConfig {
        GatewayConfig::new("key", "fast")
            .with_alias("fast", ModelEndpoint::new("fast-v1", "http://host/api/v3"))
            .with_alias("online", ModelEndpoint::new("bot-1", "http://host/api/v3/bots"))
    }

    #[test]
    fn test_resolve_default() {
        let config = test_config();
        let endpoint = config.resolve(None).unwrap();
        assert_eq!(endpoint.id, "fast-v1");
    }

    #[test]
    fn test_resolve_routes_per_alias() {
        let config = test_config();
        let endpoint = config.resolve(Some("online")).unwrap();
        assert_eq!(
            endpoint.completions_url(),
            "http://host/api/v3/bots/chat/completions"
        );
    }

    #[test]
    fn test_resolve_unknown_alias_is_fatal() {
        let config = test_config();
        let err = config.resolve(Some("nope")).unwrap_err();
        assert!(matches!(err, GatewayError::UnknownModel(alias) if alias == "nope"));
    }

    #[test]
    fn test_resolve_unknown_default_is_fatal() {
        let config = GatewayConfig::new("key", "missing");
        assert!(config.resolve(None).is_err());
    }
}
