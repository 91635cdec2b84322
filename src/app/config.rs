use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::error::{PaymentError, Result};
use crate::services::providers::{
    AirwallexConfig, AlipayConfig, GcConfig, PaypalConfig, StripeConfig, WechatPayConfig,
};

const DEFAULT_PORT: u16 = 9999;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// One configured provider. `name` is what callers address it by, `type`
/// picks the adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(flatten)]
    pub settings: ProviderSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderSettings {
    Dummy,
    Balance,
    Stripe(StripeConfig),
    Paypal(PaypalConfig),
    Airwallex(AirwallexConfig),
    Gc(GcConfig),
    Alipay(AlipayConfig),
    Wechat(WechatPayConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub server_port: u16,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            providers: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PaymentError::Config(format!("invalid config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PaymentError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Reads `path` when given, otherwise starts from the defaults, then
    /// applies `PORT` and `HTTP_TIMEOUT_SECS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.server_port = env::var("PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(self.server_port);
        self.http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse().ok())
            .unwrap_or(self.http_timeout_secs);
    }
}
