use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::app::{Config, ProviderEntry, ProviderSettings};
use crate::error::{PaymentError, Result};
use crate::services::http_client::build_client;
use crate::services::provider::PaymentProvider;
use crate::services::providers::{
    AirwallexProvider, AlipayConfig, AlipayGateway, AlipayProvider, BalanceProvider, DummyProvider,
    GcProvider, PaypalProvider, StripeProvider, WechatPayConfig, WechatPayGateway, WechatPayProvider,
};

pub type AlipayConnector = Box<dyn Fn(&AlipayConfig) -> Result<Arc<dyn AlipayGateway>> + Send + Sync>;
pub type WechatConnector = Box<dyn Fn(&WechatPayConfig) -> Result<Arc<dyn WechatPayGateway>> + Send + Sync>;

/// Builders for the gateways whose request signing lives outside this crate.
#[derive(Default)]
pub struct GatewayConnectors {
    pub alipay: Option<AlipayConnector>,
    pub wechat: Option<WechatConnector>,
}

/// Configured providers by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config, connectors: &GatewayConnectors) -> Result<Self> {
        let http = build_client(Duration::from_secs(config.http_timeout_secs))?;
        let registry = Self::new();

        for entry in &config.providers {
            let provider = build_provider(entry, http.clone(), connectors)?;
            if registry.providers.contains_key(&entry.name) {
                return Err(PaymentError::Config(format!("duplicate provider name: {}", entry.name)));
            }
            info!("Registered {} provider as {}", provider.name(), entry.name);
            registry.register(&entry.name, provider);
        }

        Ok(registry)
    }

    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PaymentProvider>> {
        self.providers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PaymentError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn build_provider(
    entry: &ProviderEntry,
    http: reqwest::Client,
    connectors: &GatewayConnectors,
) -> Result<Arc<dyn PaymentProvider>> {
    let provider: Arc<dyn PaymentProvider> = match &entry.settings {
        ProviderSettings::Dummy => Arc::new(DummyProvider::new()),
        ProviderSettings::Balance => Arc::new(BalanceProvider::new()),
        ProviderSettings::Stripe(config) => Arc::new(StripeProvider::new(config.clone(), http)?),
        ProviderSettings::Paypal(config) => Arc::new(PaypalProvider::new(config.clone(), http)?),
        ProviderSettings::Airwallex(config) => Arc::new(AirwallexProvider::new(config.clone(), http)?),
        ProviderSettings::Gc(config) => Arc::new(GcProvider::new(config.clone(), http)?),
        ProviderSettings::Alipay(config) => Arc::new(AlipayProvider::new(config.clone(), |config| {
            match &connectors.alipay {
                Some(connect) => connect(config),
                None => Err(missing_connector(&entry.name)),
            }
        })?),
        ProviderSettings::Wechat(config) => Arc::new(WechatPayProvider::new(config.clone(), |config| {
            match &connectors.wechat {
                Some(connect) => connect(config),
                None => Err(missing_connector(&entry.name)),
            }
        })?),
    };
    Ok(provider)
}

fn missing_connector(name: &str) -> PaymentError {
    PaymentError::Config(format!("provider {} needs a gateway connector", name))
}
