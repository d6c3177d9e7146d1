//! Configuration types and loading logic.

use egress_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::Result;

/// Top-level router configuration. Lives only for the process lifetime;
/// runtime proxy changes are never written back.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream proxy applied at startup. Absent means start with the
    /// platform default policy.
    #[serde(default)]
    pub proxy: Option<UpstreamConfig>,

    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Control API listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Upstream proxy endpoint as written in config. Validated on apply.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: i64,
}

fn default_listen_address() -> String {
    "127.0.0.1:3090".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (EGRESS_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(config_path))
                .merge(Env::prefixed("EGRESS_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }
}
