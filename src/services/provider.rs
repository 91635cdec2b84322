use async_trait::async_trait;

use crate::error::{PaymentError, Result};
use crate::models::{InvoiceRequest, NotificationResult, PaymentRequest, PaymentResponse};

/// The capability set every gateway adapter exposes.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider type tag, e.g. `"stripe"`.
    fn name(&self) -> &'static str;

    /// Starts a payment. Called once per attempt; never retries.
    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse>;

    /// Resolves the current state of `order_id`, querying the gateway when
    /// it supports it. `body` is the raw callback payload and may be empty.
    ///
    /// Repeated calls for an unchanged gateway-side order return the same
    /// status.
    async fn notify(&self, body: &[u8], order_id: &str) -> Result<NotificationResult>;

    /// Issues an invoice and returns its URL or reference. Gateways without
    /// invoicing return an empty string.
    async fn get_invoice(&self, _request: &InvoiceRequest) -> Result<String> {
        Ok(String::new())
    }

    /// Body a webhook handler should answer the gateway with.
    fn response_ack(&self, error: Option<&PaymentError>) -> String;
}

/// `"success"` / `"fail"`, the token most gateways look for.
pub(crate) fn plain_ack(error: Option<&PaymentError>) -> String {
    match error {
        None => "success".to_string(),
        Some(_) => "fail".to_string(),
    }
}
