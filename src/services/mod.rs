pub mod atomic_metrics;
pub mod http_client;
pub mod payment_service;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod token_cache;

pub use atomic_metrics::{AtomicMetrics, MetricsSnapshot};
pub use payment_service::PaymentService;
pub use provider::PaymentProvider;
pub use registry::{GatewayConnectors, ProviderRegistry};
