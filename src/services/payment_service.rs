use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{PaymentError, Result};
use crate::models::{InvoiceRequest, NotificationResult, PaymentRequest, PaymentResponse};
use crate::services::atomic_metrics::{AtomicMetrics, MetricsSnapshot};
use crate::services::registry::ProviderRegistry;

/// Routes calls to the named provider and keeps counters.
pub struct PaymentService {
    registry: Arc<ProviderRegistry>,
    metrics: Arc<AtomicMetrics>,
}

impl PaymentService {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            metrics: Arc::new(AtomicMetrics::new()),
        }
    }

    pub async fn pay(&self, provider_name: &str, request: &PaymentRequest) -> Result<PaymentResponse> {
        let provider = self.registry.get(provider_name)?;
        self.metrics.increment_pay_initiated();
        info!("Starting payment {} via {}", request.payment_name, provider_name);

        match provider.pay(request).await {
            Ok(response) => {
                info!("Payment {} created with order {}", request.payment_name, response.order_id);
                Ok(response)
            }
            Err(e) => {
                self.metrics.increment_pay_failed();
                error!("Payment {} via {} failed: {}", request.payment_name, provider_name, e);
                Err(e)
            }
        }
    }

    pub async fn notify(&self, provider_name: &str, body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let provider = self.registry.get(provider_name)?;

        match provider.notify(body, order_id).await {
            Ok(result) => {
                self.metrics.increment_notify_resolved(result.is_paid());
                if let Some(message) = &result.notify_message {
                    warn!("Order {} via {} resolved as {}: {}", order_id, provider_name, result.payment_status, message);
                } else {
                    info!("Order {} via {} resolved as {}", order_id, provider_name, result.payment_status);
                }
                Ok(result)
            }
            Err(e) => {
                self.metrics.increment_notify_failed();
                error!("Resolving order {} via {} failed: {}", order_id, provider_name, e);
                Err(e)
            }
        }
    }

    pub async fn get_invoice(&self, provider_name: &str, request: &InvoiceRequest) -> Result<String> {
        let provider = self.registry.get(provider_name)?;
        provider.get_invoice(request).await
    }

    /// Webhook acknowledgement body in the provider's expected format.
    pub fn ack(&self, provider_name: &str, error: Option<&PaymentError>) -> Result<String> {
        Ok(self.registry.get(provider_name)?.response_ack(error))
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
