use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{PaymentError, Result};
use crate::models::{NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus, StatusMapping};
use crate::services::http_client::{endpoint, read_json};
use crate::services::provider::{plain_ack, PaymentProvider};
use crate::utils::money::{from_minor_units, to_minor_units};
use crate::utils::{AttachLayout, Attachment};

const PROVIDER: &str = "stripe";
const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const METADATA_KEY: &str = "product_description";
const SESSION_LIFETIME_MINUTES: i64 = 30;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeConfig {
    #[serde(default)]
    pub publishable_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Hosted Stripe Checkout. Each payment creates a one-off product and
/// price, then a checkout session the payer is redirected to.
#[derive(Debug, Clone)]
pub struct StripeProvider {
    http: Client,
    api_base: String,
    publishable_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    payment_intent: Option<Expandable>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    amount: i64,
    currency: String,
}

/// Checkout sessions carry two axes; the payment axis only matters once
/// the session itself is complete.
pub fn map_checkout_status(status: &str, payment_status: &str) -> StatusMapping {
    match status {
        "open" => Ok(PaymentStatus::Created),
        "expired" => Ok(PaymentStatus::Timeout),
        "complete" => match payment_status {
            "paid" => Ok(PaymentStatus::Paid),
            "unpaid" => Ok(PaymentStatus::Created),
            other => Err(format!("unexpected stripe checkout payment status: {}", other)),
        },
        other => Err(format!("unexpected stripe checkout status: {}", other)),
    }
}

impl StripeProvider {
    pub fn new(config: StripeConfig, http: Client) -> Result<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(PaymentError::Config("stripe secret key is required".to_string()));
        }

        Ok(Self {
            http,
            api_base: config
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            publishable_key: config.publishable_key,
            secret_key: config.secret_key,
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await?;
        read_json(PROVIDER, operation, response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, operation: &'static str, segments: &[&str]) -> Result<T> {
        let response = self
            .http
            .get(endpoint(&self.api_base, segments)?)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        read_json(PROVIDER, operation, response).await
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request.validate()?;
        let description = request.attachment().encode(AttachLayout::NameFirst);
        let unit_amount = to_minor_units(request.price).to_string();

        let product: StripeObject = self
            .post_form(
                "create product",
                "/v1/products",
                &[
                    ("name", request.product_display_name.clone()),
                    ("description", description.clone()),
                    ("default_price_data[unit_amount]", unit_amount.clone()),
                    ("default_price_data[currency]", request.currency.clone()),
                ],
            )
            .await?;

        let price: StripeObject = self
            .post_form(
                "create price",
                "/v1/prices",
                &[
                    ("currency", request.currency.clone()),
                    ("unit_amount", unit_amount),
                    ("product", product.id),
                ],
            )
            .await?;

        let expires_at = (Utc::now() + Duration::minutes(SESSION_LIFETIME_MINUTES)).timestamp();
        let session: CheckoutSession = self
            .post_form(
                "create checkout session",
                "/v1/checkout/sessions",
                &[
                    ("line_items[0][price]", price.id),
                    ("line_items[0][quantity]", "1".to_string()),
                    ("mode", "payment".to_string()),
                    ("success_url", request.return_url.clone()),
                    ("cancel_url", request.return_url.clone()),
                    ("client_reference_id", request.payment_name.clone()),
                    ("expires_at", expires_at.to_string()),
                    ("metadata[product_description]", description),
                ],
            )
            .await?;

        info!("Stripe checkout session {} created for payment {}", session.id, request.payment_name);

        let mut attach_info = HashMap::new();
        attach_info.insert("sessionId".to_string(), Value::String(session.id.clone()));
        if !self.publishable_key.is_empty() {
            attach_info.insert(
                "publishableKey".to_string(),
                Value::String(self.publishable_key.clone()),
            );
        }

        Ok(PaymentResponse {
            pay_url: session.url.unwrap_or_default(),
            order_id: session.id,
            attach_info,
        })
    }

    async fn notify(&self, _body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let session: CheckoutSession = self
            .get("retrieve checkout session", &["v1", "checkout", "sessions", order_id])
            .await?;

        let status = session.status.as_deref().unwrap_or_default();
        let payment_status = session.payment_status.as_deref().unwrap_or_default();
        let mapping = map_checkout_status(status, payment_status);
        debug!("Stripe session {} is {}/{} -> {:?}", order_id, status, payment_status, mapping);

        if mapping != Ok(PaymentStatus::Paid) {
            let mut result = NotificationResult::from_mapping(order_id, mapping);
            result.payment_name = session.client_reference_id.unwrap_or_default();
            return Ok(result);
        }

        // A paid session always references the PaymentIntent that settled it
        let intent_id = session
            .payment_intent
            .as_ref()
            .map(|intent| intent.id().to_string())
            .ok_or_else(|| {
                PaymentError::gateway(PROVIDER, "retrieve checkout session", "paid session has no payment intent")
            })?;
        let intent: PaymentIntent = self
            .get("retrieve payment intent", &["v1", "payment_intents", intent_id.as_str()])
            .await?;

        let attachment = session
            .metadata
            .get(METADATA_KEY)
            .map(|packed| Attachment::decode_lenient(packed, AttachLayout::NameFirst))
            .unwrap_or_default();

        let mut result = NotificationResult::with_status(order_id, PaymentStatus::Paid).with_attachment(attachment);
        result.payment_name = session.client_reference_id.unwrap_or_default();
        result.price = from_minor_units(intent.amount);
        result.currency = intent.currency;

        info!("Stripe payment {} settled ({} {})", result.payment_name, result.price, result.currency);
        Ok(result)
    }

    fn response_ack(&self, error: Option<&PaymentError>) -> String {
        plain_ack(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use rstest::rstest;
    use serde_json::json;

    fn provider(api_base: String) -> StripeProvider {
        StripeProvider::new(
            StripeConfig {
                publishable_key: "pk_test".to_string(),
                secret_key: "sk_test".to_string(),
                api_base: Some(api_base),
            },
            Client::new(),
        )
        .unwrap()
    }

    #[rstest]
    #[case("open", "unpaid", PaymentStatus::Created)]
    #[case("open", "", PaymentStatus::Created)]
    #[case("expired", "unpaid", PaymentStatus::Timeout)]
    #[case("complete", "paid", PaymentStatus::Paid)]
    #[case("complete", "unpaid", PaymentStatus::Created)]
    fn test_documented_states(#[case] status: &str, #[case] payment: &str, #[case] expected: PaymentStatus) {
        assert_eq!(map_checkout_status(status, payment), Ok(expected));
    }

    #[rstest]
    #[case("FOO_BAR", "paid", "FOO_BAR")]
    #[case("complete", "FOO_BAR", "FOO_BAR")]
    #[case("complete", "no_payment_required", "no_payment_required")]
    fn test_unknown_states(#[case] status: &str, #[case] payment: &str, #[case] raw: &str) {
        let message = map_checkout_status(status, payment).unwrap_err();
        assert!(message.contains(raw), "{message}");
    }

    #[test]
    fn test_missing_secret_key() {
        let err = StripeProvider::new(StripeConfig::default(), Client::new()).unwrap_err();
        assert!(matches!(err, PaymentError::Config(_)));
    }

    #[tokio::test]
    async fn test_pay_creates_checkout_session() {
        let mut server = Server::new_async().await;
        let product = server
            .mock("POST", "/v1/products")
            .match_header("authorization", "Bearer sk_test")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "Gold Plan".into()),
                Matcher::UrlEncoded("description".into(), "gold|Gold Plan|stripe-main".into()),
                Matcher::UrlEncoded("default_price_data[unit_amount]".into(), "9999".into()),
            ]))
            .with_body(json!({"id": "prod_1"}).to_string())
            .create_async()
            .await;
        let price = server
            .mock("POST", "/v1/prices")
            .match_body(Matcher::UrlEncoded("product".into(), "prod_1".into()))
            .with_body(json!({"id": "price_1"}).to_string())
            .create_async()
            .await;
        let session = server
            .mock("POST", "/v1/checkout/sessions")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("line_items[0][price]".into(), "price_1".into()),
                Matcher::UrlEncoded("client_reference_id".into(), "order_1".into()),
                Matcher::UrlEncoded("mode".into(), "payment".into()),
            ]))
            .with_body(json!({"id": "cs_1", "url": "https://checkout.stripe.com/c/cs_1"}).to_string())
            .create_async()
            .await;

        let request = PaymentRequest {
            provider_name: "stripe-main".to_string(),
            product_name: "gold".to_string(),
            product_display_name: "Gold Plan".to_string(),
            payment_name: "order_1".to_string(),
            price: 99.99,
            currency: "usd".to_string(),
            return_url: "https://shop.example/return".to_string(),
            ..Default::default()
        };
        let response = provider(server.url()).pay(&request).await.unwrap();

        assert_eq!(response.order_id, "cs_1");
        assert_eq!(response.pay_url, "https://checkout.stripe.com/c/cs_1");
        assert_eq!(response.attach_info["publishableKey"], json!("pk_test"));
        product.assert_async().await;
        price.assert_async().await;
        session.assert_async().await;
    }

    #[tokio::test]
    async fn test_pay_surfaces_gateway_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/products")
            .with_status(400)
            .with_body(json!({"error": {"message": "Invalid currency: zzz"}}).to_string())
            .create_async()
            .await;

        let request = PaymentRequest {
            payment_name: "order_1".to_string(),
            price: 1.0,
            currency: "zzz".to_string(),
            ..Default::default()
        };
        let err = provider(server.url()).pay(&request).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("create product"), "{message}");
        assert!(message.contains("Invalid currency"), "{message}");
    }

    #[tokio::test]
    async fn test_notify_paid_session() {
        let mut server = Server::new_async().await;
        let session = server
            .mock("GET", "/v1/checkout/sessions/cs_1")
            .with_body(
                json!({
                    "id": "cs_1",
                    "status": "complete",
                    "payment_status": "paid",
                    "client_reference_id": "order_1",
                    "payment_intent": "pi_1",
                    "metadata": {"product_description": "gold|Gold Plan|stripe-main"}
                })
                .to_string(),
            )
            .expect(2)
            .create_async()
            .await;
        let _m = server
            .mock("GET", "/v1/payment_intents/pi_1")
            .with_body(json!({"id": "pi_1", "amount": 9999, "currency": "usd"}).to_string())
            .expect(2)
            .create_async()
            .await;

        let provider = provider(server.url());
        let first = provider.notify(b"", "cs_1").await.unwrap();
        let second = provider.notify(b"{\"type\":\"checkout.session.completed\"}", "cs_1").await.unwrap();

        assert_eq!(first.payment_status, PaymentStatus::Paid);
        assert_eq!(first.payment_name, "order_1");
        assert_eq!(first.price, 99.99);
        assert_eq!(first.currency, "usd");
        assert_eq!(first.product_name, "gold");
        assert_eq!(first.product_display_name, "Gold Plan");
        assert_eq!(first.provider_name, "stripe-main");
        assert_eq!(first, second);
        session.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_tolerates_bad_metadata() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/checkout/sessions/cs_2")
            .with_body(
                json!({
                    "id": "cs_2",
                    "status": "complete",
                    "payment_status": "paid",
                    "client_reference_id": "order_2",
                    "payment_intent": {"id": "pi_2", "object": "payment_intent"},
                    "metadata": {"product_description": "not-an-attachment"}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _m = server
            .mock("GET", "/v1/payment_intents/pi_2")
            .with_body(json!({"id": "pi_2", "amount": 500, "currency": "eur"}).to_string())
            .create_async()
            .await;

        let result = provider(server.url()).notify(b"", "cs_2").await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Paid);
        assert_eq!(result.product_name, "");
        assert_eq!(result.price, 5.0);
    }

    #[tokio::test]
    async fn test_notify_open_and_unknown_sessions() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/checkout/sessions/cs_open")
            .with_body(json!({"id": "cs_open", "status": "open", "payment_status": "unpaid", "client_reference_id": "order_3"}).to_string())
            .create_async()
            .await;
        let _m = server
            .mock("GET", "/v1/checkout/sessions/cs_odd")
            .with_body(json!({"id": "cs_odd", "status": "FOO_BAR"}).to_string())
            .create_async()
            .await;

        let provider = provider(server.url());
        let open = provider.notify(b"", "cs_open").await.unwrap();
        assert_eq!(open.payment_status, PaymentStatus::Created);
        assert_eq!(open.payment_name, "order_3");

        let odd = provider.notify(b"", "cs_odd").await.unwrap();
        assert_eq!(odd.payment_status, PaymentStatus::Error);
        assert!(odd.notify_message.unwrap().contains("FOO_BAR"));
    }

    #[tokio::test]
    async fn test_notify_keeps_order_id_in_one_segment() {
        let mut server = Server::new_async().await;
        let customer = server
            .mock("GET", "/v1/customers/cus_1")
            .with_body(json!({"id": "cus_1", "status": "open"}).to_string())
            .expect(0)
            .create_async()
            .await;

        let provider = provider(server.url());
        assert!(provider.notify(b"", "../../customers/cus_1").await.is_err());
        let err = provider.notify(b"", "..").await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidRequest(_)));
        customer.assert_async().await;
    }

    #[test]
    fn test_ack_tokens() {
        let provider = StripeProvider::new(
            StripeConfig {
                secret_key: "sk".to_string(),
                ..Default::default()
            },
            Client::new(),
        )
        .unwrap();
        assert_eq!(provider.response_ack(None), "success");
        assert_eq!(
            provider.response_ack(Some(&PaymentError::Decoding("x".to_string()))),
            "fail"
        );
    }
}
