use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::{PaymentError, Result};
use crate::utils::Attachment;

/// Where the payer is completing the payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEnv {
    #[default]
    Standard,
    /// WeChat's in-app browser, which pays through the JS-SDK instead of a QR code
    WechatBrowser,
}

/// One payment attempt. Built fresh per attempt and never stored here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRequest {
    pub provider_name: String,
    pub product_name: String,
    pub product_display_name: String,
    pub product_description: Option<String>,
    pub product_image: Option<String>,
    pub payer_id: String,
    pub payer_name: String,
    pub payer_email: String,
    /// Caller-unique name; the key used to correlate later notifications
    pub payment_name: String,
    pub price: f64,
    pub currency: String,
    pub return_url: String,
    pub notify_url: String,
    pub payment_env: PaymentEnv,
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<()> {
        if self.payment_name.trim().is_empty() {
            return Err(PaymentError::InvalidRequest("payment name is empty".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(PaymentError::InvalidRequest(format!(
                "price must be a non-negative amount, got {}",
                self.price
            )));
        }
        Ok(())
    }

    /// The price with `-0.0` folded into `0.0`.
    pub fn amount(&self) -> f64 {
        if self.price == 0.0 {
            0.0
        } else {
            self.price
        }
    }

    pub fn attachment(&self) -> Attachment {
        Attachment::new(
            self.product_name.clone(),
            self.product_display_name.clone(),
            self.provider_name.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    /// Redirect target; empty when the flow completes client-side
    pub pay_url: String,
    pub order_id: String,
    /// Provider-specific values the client needs to finish paying
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attach_info: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Initiated, waiting for the payer
    #[default]
    Created,
    /// Funds captured or settled
    Paid,
    /// Aborted by the buyer or the gateway before payment
    Canceled,
    /// Expired without payment
    Timeout,
    /// Unexpected or unmapped gateway state; the result carries a message
    Error,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "Created",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Canceled => "Canceled",
            PaymentStatus::Timeout => "Timeout",
            PaymentStatus::Error => "Error",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a state-mapping function: a normalized status, or the
/// message describing a vendor state that has no mapping.
pub type StatusMapping = std::result::Result<PaymentStatus, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResult {
    pub payment_name: String,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_message: Option<String>,

    pub product_name: String,
    pub product_display_name: String,
    pub provider_name: String,
    pub price: f64,
    pub currency: String,

    pub order_id: String,
}

impl NotificationResult {
    /// A result carrying only a status, used for every outcome short of `Paid`.
    pub fn with_status(order_id: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            order_id: order_id.into(),
            payment_status: status,
            ..Default::default()
        }
    }

    pub fn unmapped(order_id: impl Into<String>, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "unexpected gateway state".to_string();
        }
        Self {
            order_id: order_id.into(),
            payment_status: PaymentStatus::Error,
            notify_message: Some(message),
            ..Default::default()
        }
    }

    pub fn from_mapping(order_id: impl Into<String>, mapping: StatusMapping) -> Self {
        match mapping {
            Ok(status) => Self::with_status(order_id, status),
            Err(message) => Self::unmapped(order_id, message),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.notify_message = Some(message.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.product_name = attachment.product_name;
        self.product_display_name = attachment.product_display_name;
        self.provider_name = attachment.provider_name;
        self
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}
