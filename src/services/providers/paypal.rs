use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{PaymentError, Result};
use crate::models::{NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus, StatusMapping};
use crate::services::http_client::{endpoint, extract_error_message, read_json};
use crate::services::provider::{plain_ack, PaymentProvider};
use crate::services::token_cache::{CachedToken, TokenCache};
use crate::utils::money::{parse_major_string, to_major_string};
use crate::utils::random::random_string;
use crate::utils::{AttachLayout, Attachment};

const PROVIDER: &str = "paypal";
const LIVE_API_BASE: &str = "https://api-m.paypal.com";
const SANDBOX_API_BASE: &str = "https://api-m.sandbox.paypal.com";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaypalConfig {
    pub client_id: String,
    pub secret: String,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Shown on the PayPal approval page
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// PayPal Orders v2 with the CAPTURE intent.
pub struct PaypalProvider {
    http: Client,
    api_base: String,
    client_id: String,
    secret: String,
    brand_name: Option<String>,
    locale: Option<String>,
    token: TokenCache,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct Amount {
    currency_code: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    issue: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

/// What a failed order call means for the notification.
enum OrderIssue {
    AlreadyCaptured,
    NotApproved(String),
    Failed(String),
}

fn classify_error(body: &str) -> OrderIssue {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let Some(detail) = parsed.details.into_iter().next() else {
        let message = if parsed.message.is_empty() {
            extract_error_message(body)
        } else {
            parsed.message
        };
        return OrderIssue::Failed(message);
    };

    match detail.issue.as_str() {
        "ORDER_ALREADY_CAPTURED" => OrderIssue::AlreadyCaptured,
        "ORDER_NOT_APPROVED" => OrderIssue::NotApproved(detail.description),
        _ if detail.description.is_empty() => OrderIssue::Failed(detail.issue),
        _ => OrderIssue::Failed(detail.description),
    }
}

pub fn map_order_status(status: &str) -> StatusMapping {
    match status {
        "COMPLETED" => Ok(PaymentStatus::Paid),
        "CREATED" | "SAVED" | "APPROVED" | "PAYER_ACTION_REQUIRED" => Ok(PaymentStatus::Created),
        "VOIDED" => Ok(PaymentStatus::Canceled),
        other => Err(format!("unexpected paypal order status: {}", other)),
    }
}

impl PaypalProvider {
    pub fn new(config: PaypalConfig, http: Client) -> Result<Self> {
        if config.client_id.trim().is_empty() || config.secret.trim().is_empty() {
            return Err(PaymentError::Config("paypal client id and secret are required".to_string()));
        }

        let default_base = if config.sandbox { SANDBOX_API_BASE } else { LIVE_API_BASE };
        Ok(Self {
            http,
            api_base: config
                .api_base
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            client_id: config.client_id,
            secret: config.secret,
            brand_name: config.brand_name,
            locale: config.locale,
            token: TokenCache::new(),
        })
    }

    async fn access_token(&self) -> Result<String> {
        self.token
            .get_or_refresh(|| async {
                let response = self
                    .http
                    .post(format!("{}/v1/oauth2/token", self.api_base))
                    .basic_auth(&self.client_id, Some(&self.secret))
                    .form(&[("grant_type", "client_credentials")])
                    .send()
                    .await?;
                let token: AccessToken = read_json(PROVIDER, "fetch access token", response).await?;
                Ok(CachedToken::new(
                    token.access_token,
                    Utc::now() + Duration::seconds(token.expires_in),
                ))
            })
            .await
    }

    async fn post_order(&self, segments: &[&str], body: &serde_json::Value) -> Result<Response> {
        let url = endpoint(&self.api_base, segments)?;
        let token = self.access_token().await?;
        let response = self.http.post(url).bearer_auth(token).json(body).send().await?;
        self.drop_rejected_token(&response).await;
        Ok(response)
    }

    async fn get_order(&self, order_id: &str) -> Result<Response> {
        let url = endpoint(&self.api_base, &["v2", "checkout", "orders", order_id])?;
        let token = self.access_token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        self.drop_rejected_token(&response).await;
        Ok(response)
    }

    /// A revoked token is refetched on the next call instead of at expiry.
    async fn drop_rejected_token(&self, response: &Response) {
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("PayPal rejected the cached access token");
            self.token.invalidate().await;
        }
    }
}

#[async_trait]
impl PaymentProvider for PaypalProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request.validate()?;

        let mut context = json!({
            "return_url": request.return_url,
            "cancel_url": request.return_url,
        });
        if let Some(brand_name) = &self.brand_name {
            context["brand_name"] = json!(brand_name);
        }
        if let Some(locale) = &self.locale {
            context["locale"] = json!(locale);
        }

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": random_string(16),
                "custom_id": request.payment_name,
                "amount": {
                    "currency_code": request.currency,
                    "value": to_major_string(request.price),
                },
                "description": request.attachment().encode(AttachLayout::DisplayFirst),
            }],
            "application_context": context,
        });

        let response = self.post_order(&["v2", "checkout", "orders"], &body).await?;
        let order: Order = read_json(PROVIDER, "create order", response).await?;

        let approve = order
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone())
            .ok_or_else(|| PaymentError::gateway(PROVIDER, "create order", "response has no approve link"))?;

        info!("PayPal order {} created for payment {}", order.id, request.payment_name);
        Ok(PaymentResponse {
            pay_url: approve,
            order_id: order.id,
            ..Default::default()
        })
    }

    async fn notify(&self, _body: &[u8], order_id: &str) -> Result<NotificationResult> {
        // Capturing is how a PayPal order settles; a second capture reports
        // ORDER_ALREADY_CAPTURED, which makes repeated notifications a read.
        let capture = self
            .post_order(&["v2", "checkout", "orders", order_id, "capture"], &json!({}))
            .await?;
        if !capture.status().is_success() {
            let body = capture.text().await?;
            match classify_error(&body) {
                OrderIssue::AlreadyCaptured => {}
                OrderIssue::NotApproved(description) => {
                    return Ok(NotificationResult::with_status(order_id, PaymentStatus::Canceled)
                        .with_message(description));
                }
                OrderIssue::Failed(message) => {
                    return Err(PaymentError::gateway(PROVIDER, "capture order", message));
                }
            }
        }

        let detail = self.get_order(order_id).await?;
        if !detail.status().is_success() {
            let body = detail.text().await?;
            return match classify_error(&body) {
                OrderIssue::NotApproved(description) => {
                    Ok(NotificationResult::with_status(order_id, PaymentStatus::Canceled)
                        .with_message(description))
                }
                OrderIssue::AlreadyCaptured => Err(PaymentError::gateway(
                    PROVIDER,
                    "get order",
                    "unexpected ORDER_ALREADY_CAPTURED on read",
                )),
                OrderIssue::Failed(message) => Err(PaymentError::gateway(PROVIDER, "get order", message)),
            };
        }
        let order: Order = read_json(PROVIDER, "get order", detail).await?;

        let payment_name = order
            .purchase_units
            .first()
            .and_then(|unit| unit.custom_id.clone())
            .unwrap_or_else(|| order.id.clone());

        let mapping = map_order_status(&order.status);
        if mapping != Ok(PaymentStatus::Paid) {
            if mapping.is_err() {
                warn!("PayPal order {} has unmapped status {}", order_id, order.status);
            }
            let mut result = NotificationResult::from_mapping(order_id, mapping);
            result.payment_name = payment_name;
            return Ok(result);
        }

        let unit = order
            .purchase_units
            .first()
            .ok_or_else(|| PaymentError::gateway(PROVIDER, "get order", "order has no purchase units"))?;
        let price = parse_major_string(&unit.amount.value)?;
        // Product context is needed to reconcile a captured PayPal order
        let attachment = Attachment::decode(unit.description.as_deref().unwrap_or_default(), AttachLayout::DisplayFirst)?;

        let mut result = NotificationResult::with_status(order_id, PaymentStatus::Paid).with_attachment(attachment);
        result.payment_name = payment_name;
        result.price = price;
        result.currency = unit.amount.currency_code.clone();

        info!("PayPal order {} captured for payment {}", order_id, result.payment_name);
        Ok(result)
    }

    fn response_ack(&self, error: Option<&PaymentError>) -> String {
        plain_ack(error)
    }
}
