use async_trait::async_trait;

use crate::error::{PaymentError, Result};
use crate::models::{NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus};
use crate::services::provider::PaymentProvider;

/// Accepts every payment immediately. Meant for development setups.
#[derive(Debug, Default, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request.validate()?;
        Ok(PaymentResponse {
            pay_url: request.return_url.clone(),
            order_id: request.payment_name.clone(),
            ..Default::default()
        })
    }

    async fn notify(&self, _body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let mut result = NotificationResult::with_status(order_id, PaymentStatus::Paid);
        result.payment_name = order_id.to_string();
        Ok(result)
    }

    fn response_ack(&self, _error: Option<&PaymentError>) -> String {
        String::new()
    }
}
