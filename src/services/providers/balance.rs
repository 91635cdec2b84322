use async_trait::async_trait;

use crate::error::{PaymentError, Result};
use crate::models::{NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus};
use crate::services::provider::PaymentProvider;

/// Pays from an account balance the caller already debited.
///
/// Payer ids have the form `owner/name`; the order id becomes
/// `owner/payment_name`.
#[derive(Debug, Default, Clone)]
pub struct BalanceProvider;

impl BalanceProvider {
    pub fn new() -> Self {
        Self
    }
}

fn split_owner(id: &str) -> Result<(&str, &str)> {
    match id.split('/').collect::<Vec<_>>().as_slice() {
        [owner, name] => Ok((*owner, *name)),
        _ => Err(PaymentError::InvalidRequest(format!(
            "expected an id of the form owner/name, got: {}",
            id
        ))),
    }
}

#[async_trait]
impl PaymentProvider for BalanceProvider {
    fn name(&self) -> &'static str {
        "balance"
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request.validate()?;
        let (owner, _) = split_owner(&request.payer_id)?;
        Ok(PaymentResponse {
            pay_url: request.return_url.clone(),
            order_id: format!("{}/{}", owner, request.payment_name),
            ..Default::default()
        })
    }

    async fn notify(&self, _body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let mut result = NotificationResult::with_status(order_id, PaymentStatus::Paid);
        if let Ok((_, payment_name)) = split_owner(order_id) {
            result.payment_name = payment_name.to_string();
        }
        Ok(result)
    }

    fn response_ack(&self, _error: Option<&PaymentError>) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(payer_id: &str) -> PaymentRequest {
        PaymentRequest {
            payer_id: payer_id.to_string(),
            payment_name: "payment_42".to_string(),
            price: 3.5,
            return_url: "https://app.example/back".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_order_id_uses_owner() {
        let provider = BalanceProvider::new();
        let response = provider.pay(&request("acme/alice")).await.unwrap();
        assert_eq!(response.order_id, "acme/payment_42");
        assert_eq!(response.pay_url, "https://app.example/back");

        let result = provider.notify(b"", &response.order_id).await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Paid);
        assert_eq!(result.payment_name, "payment_42");
    }

    proptest::proptest! {
        #[test]
        fn prop_order_id_recovers_payment_name(owner in "[a-z0-9_-]{1,12}", name in "[a-zA-Z0-9_]{1,16}") {
            let provider = BalanceProvider::new();
            let mut req = request(&format!("{}/someone", owner));
            req.payment_name = name.clone();

            let response = tokio_test::block_on(provider.pay(&req)).unwrap();
            let result = tokio_test::block_on(provider.notify(b"", &response.order_id)).unwrap();
            proptest::prop_assert_eq!(result.payment_name, name);
        }
    }

    #[tokio::test]
    async fn test_malformed_payer_id() {
        let provider = BalanceProvider::new();
        let err = provider.pay(&request("alice")).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidRequest(_)));
    }
}
