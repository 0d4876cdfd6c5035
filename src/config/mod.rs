use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

/// Daraja credentials and push parameters. All secrets come from the
/// environment or per-env config files, never from code.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub url: String,
    pub service_key: String,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("CHAMAPOOL").separator("__"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))
    }
}
