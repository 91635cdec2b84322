mod client;

pub use client::{AirwallexClient, Intent};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::error::{PaymentError, Result};
use crate::models::{NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus, StatusMapping};
use crate::services::provider::{plain_ack, PaymentProvider};
use crate::utils::money::to_trimmed_string;
use crate::utils::{AttachLayout, Attachment};

use client::{CreateIntent, CreatedIntent, IntentCustomer, IntentOrder, IntentProduct};

pub(crate) const PROVIDER: &str = "airwallex";
const DEFAULT_API_BASE: &str = "https://api.airwallex.com/api/v1";
const DEFAULT_CHECKOUT_BASE: &str = "https://checkout.airwallex.com/#/standalone/checkout?";
const DESCRIPTOR_MAX_CHARS: usize = 32;
const BLANK_LOGO: &str = "data:image/gif;base64,R0lGODlhAQABAAD/ACwAAAAAAQABAAACADs=";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirwallexConfig {
    pub client_id: String,
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub checkout_base: Option<String>,
}

pub struct AirwallexProvider {
    client: AirwallexClient,
    checkout_base: String,
}

/// Intent status first, then the latest attempt's status once the intent
/// reports success.
pub fn map_intent_status(intent_status: &str, attempt_status: Option<&str>) -> StatusMapping {
    match intent_status {
        "PENDING" | "REQUIRES_PAYMENT_METHOD" | "REQUIRES_CUSTOMER_ACTION" | "REQUIRES_CAPTURE" => {
            return Ok(PaymentStatus::Created)
        }
        "CANCELLED" => return Ok(PaymentStatus::Canceled),
        "EXPIRED" => return Ok(PaymentStatus::Timeout),
        "SUCCEEDED" => {}
        other => return Err(format!("unexpected airwallex checkout status: {}", other)),
    }

    match attempt_status {
        None | Some("PAID") | Some("SETTLED") => Ok(PaymentStatus::Paid),
        Some("CANCELLED")
        | Some("EXPIRED")
        | Some("RECEIVED")
        | Some("AUTHENTICATION_REDIRECTED")
        | Some("AUTHORIZED")
        | Some("CAPTURE_REQUESTED") => Ok(PaymentStatus::Created),
        Some(other) => Err(format!("unexpected airwallex checkout payment status: {}", other)),
    }
}

/// Statement descriptor: at most 32 characters of the attachment, no NULs.
fn descriptor(packed: &str) -> String {
    packed
        .chars()
        .filter(|c| *c != '\0')
        .take(DESCRIPTOR_MAX_CHARS)
        .collect()
}

impl AirwallexProvider {
    pub fn new(config: AirwallexConfig, http: Client) -> Result<Self> {
        if config.client_id.trim().is_empty() || config.api_key.trim().is_empty() {
            return Err(PaymentError::Config("airwallex client id and api key are required".to_string()));
        }

        let api_base = config.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Ok(Self {
            client: AirwallexClient::new(http, api_base, config.client_id, config.api_key),
            checkout_base: config
                .checkout_base
                .unwrap_or_else(|| DEFAULT_CHECKOUT_BASE.to_string()),
        })
    }

    fn checkout_url(&self, intent: &CreatedIntent, request: &PaymentRequest) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("intent_id", &intent.id)
            .append_pair("client_secret", &intent.client_secret)
            .append_pair("mode", "payment")
            .append_pair("currency", &request.currency)
            .append_pair("amount", &to_trimmed_string(request.price))
            .append_pair("requiredBillingContactFields", r#"["address"]"#)
            .append_pair("successUrl", &request.return_url)
            .append_pair("failUrl", &request.return_url)
            .append_pair("logoUrl", BLANK_LOGO)
            .finish();
        format!("{}{}", self.checkout_base, query)
    }
}

#[async_trait]
impl PaymentProvider for AirwallexProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request.validate()?;

        let description = request.attachment().encode(AttachLayout::NameFirst);
        let intent = CreateIntent {
            request_id: request.payment_name.clone(),
            merchant_order_id: request.payment_name.clone(),
            currency: request.currency.clone(),
            amount: request.amount(),
            descriptor: descriptor(&description),
            metadata: HashMap::from([("description".to_string(), description)]),
            order: IntentOrder {
                products: vec![IntentProduct {
                    name: request.product_display_name.clone(),
                    quantity: 1,
                    desc: request.product_description.clone().unwrap_or_default(),
                    image_url: request.product_image.clone().unwrap_or_default(),
                }],
            },
            customer: IntentCustomer {
                merchant_customer_id: request.payer_id.clone(),
                email: request.payer_email.clone(),
                first_name: request.payer_name.clone(),
                last_name: request.payer_name.clone(),
            },
        };

        let created = self.client.create_intent(&intent).await?;
        info!("Airwallex intent {} created for payment {}", created.id, request.payment_name);

        Ok(PaymentResponse {
            pay_url: self.checkout_url(&created, request),
            order_id: created.merchant_order_id,
            ..Default::default()
        })
    }

    async fn notify(&self, _body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let intent = self.client.intent_by_order_id(order_id).await?;

        let mapping = map_intent_status(&intent.status, intent.attempt_status());
        if mapping != Ok(PaymentStatus::Paid) {
            if let Err(message) = &mapping {
                warn!("Airwallex intent {}: {}", intent.id, message);
            }
            let mut result = NotificationResult::from_mapping(order_id, mapping);
            result.payment_name = order_id.to_string();
            return Ok(result);
        }

        let description = intent
            .metadata
            .get("description")
            .and_then(|value| value.as_str())
            .unwrap_or_default();
        let attachment = Attachment::decode_lenient(description, AttachLayout::NameFirst);

        let mut result = NotificationResult::with_status(&intent.merchant_order_id, PaymentStatus::Paid)
            .with_attachment(attachment);
        result.payment_name = intent.merchant_order_id.clone();
        result.price = intent.amount;
        result.currency = intent.currency;

        info!("Airwallex payment {} settled", result.order_id);
        Ok(result)
    }

    fn response_ack(&self, error: Option<&PaymentError>) -> String {
        plain_ack(error)
    }
}
