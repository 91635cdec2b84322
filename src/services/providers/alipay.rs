use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PaymentError, Result};
use crate::models::{NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus, StatusMapping};
use crate::services::provider::{plain_ack, PaymentProvider};
use crate::utils::money::{parse_major_string, to_major_string};
use crate::utils::{AttachLayout, Attachment};

const PROVIDER: &str = "alipay";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlipayConfig {
    pub app_id: String,
    pub app_certificate: String,
    pub app_private_key: String,
    pub authority_public_key: String,
    pub authority_root_public_key: String,
}

impl AlipayConfig {
    fn validate(&self) -> Result<()> {
        let required = [
            ("app_id", &self.app_id),
            ("app_certificate", &self.app_certificate),
            ("app_private_key", &self.app_private_key),
            ("authority_public_key", &self.authority_public_key),
            ("authority_root_public_key", &self.authority_root_public_key),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(PaymentError::Config(format!("alipay {} is required", field)));
            }
        }
        Ok(())
    }
}

/// Parameters of a desktop web page payment.
#[derive(Debug, Clone, PartialEq)]
pub struct AlipayPageOrder {
    pub subject: String,
    pub out_trade_no: String,
    pub total_amount: String,
    pub return_url: String,
    pub notify_url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlipayTrade {
    pub trade_status: String,
    pub subject: String,
    pub total_amount: String,
}

/// The signed Alipay OpenAPI calls the adapter needs.
///
/// Implementations own request signing and certificate handling.
#[async_trait]
pub trait AlipayGateway: Send + Sync {
    /// Returns the page URL the payer is redirected to.
    async fn trade_page_pay(&self, order: &AlipayPageOrder) -> Result<String>;

    /// `Ok(None)` when Alipay answers `ACQ.TRADE_NOT_EXIST`.
    async fn trade_query(&self, out_trade_no: &str) -> Result<Option<AlipayTrade>>;
}

pub fn map_trade_status(status: &str) -> StatusMapping {
    match status {
        "WAIT_BUYER_PAY" => Ok(PaymentStatus::Created),
        "TRADE_CLOSED" => Ok(PaymentStatus::Timeout),
        "TRADE_SUCCESS" | "TRADE_FINISHED" => Ok(PaymentStatus::Paid),
        other => Err(format!("unexpected alipay trade state: {}", other)),
    }
}

pub struct AlipayProvider {
    gateway: Arc<dyn AlipayGateway>,
}

impl AlipayProvider {
    pub fn new<F>(config: AlipayConfig, connect: F) -> Result<Self>
    where
        F: FnOnce(&AlipayConfig) -> Result<Arc<dyn AlipayGateway>>,
    {
        config.validate()?;
        let gateway = connect(&config)?;
        Ok(Self { gateway })
    }
}

#[async_trait]
impl PaymentProvider for AlipayProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request.validate()?;

        let order = AlipayPageOrder {
            subject: request.attachment().encode(AttachLayout::NameFirst),
            out_trade_no: request.payment_name.clone(),
            total_amount: to_major_string(request.price),
            return_url: request.return_url.clone(),
            notify_url: request.notify_url.clone(),
        };
        let pay_url = self.gateway.trade_page_pay(&order).await?;
        info!("Alipay page pay created for {}", request.payment_name);

        Ok(PaymentResponse {
            pay_url,
            order_id: request.payment_name.clone(),
            ..Default::default()
        })
    }

    async fn notify(&self, _body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let Some(trade) = self.gateway.trade_query(order_id).await? else {
            info!("Alipay trade {} does not exist", order_id);
            return Ok(NotificationResult::with_status(order_id, PaymentStatus::Canceled));
        };

        let mapping = map_trade_status(&trade.trade_status);
        if mapping != Ok(PaymentStatus::Paid) {
            if let Err(message) = &mapping {
                warn!("Alipay trade {}: {}", order_id, message);
            }
            let mut result = NotificationResult::from_mapping(order_id, mapping);
            result.payment_name = order_id.to_string();
            return Ok(result);
        }

        let mut result = NotificationResult::with_status(order_id, PaymentStatus::Paid)
            .with_attachment(Attachment::decode_lenient(&trade.subject, AttachLayout::NameFirst));
        result.payment_name = order_id.to_string();
        result.price = parse_major_string(&trade.total_amount)?;
        result.currency = "CNY".to_string();
        Ok(result)
    }

    fn response_ack(&self, error: Option<&PaymentError>) -> String {
        plain_ack(error)
    }
}
