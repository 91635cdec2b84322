use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{PaymentError, Result};
use crate::services::http_client::read_json;
use crate::services::token_cache::{CachedToken, TokenCache};

use super::PROVIDER;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct IntentProduct {
    pub name: String,
    pub quantity: u32,
    pub desc: String,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct IntentOrder {
    pub products: Vec<IntentProduct>,
}

#[derive(Debug, Serialize)]
pub struct IntentCustomer {
    pub merchant_customer_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateIntent {
    pub request_id: String,
    pub merchant_order_id: String,
    pub currency: String,
    pub amount: f64,
    pub descriptor: String,
    pub metadata: HashMap<String, String>,
    pub order: IntentOrder,
    pub customer: IntentCustomer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
    pub merchant_order_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentAttempt {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Intent {
    pub id: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub merchant_order_id: String,
    #[serde(default)]
    pub latest_payment_attempt: Option<PaymentAttempt>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Intent {
    /// Status of the latest attempt, if the intent has one.
    pub fn attempt_status(&self) -> Option<&str> {
        self.latest_payment_attempt
            .as_ref()
            .map(|attempt| attempt.status.as_str())
            .filter(|status| !status.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct IntentPage {
    #[serde(default)]
    items: Vec<Intent>,
}

/// Login time strings come back as `2024-05-01T10:00:00+0000`.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.replacen("+0000", "+00:00", 1);
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Minimal Airwallex REST client: login, create intent, look up an intent.
pub struct AirwallexClient {
    http: Client,
    api_base: String,
    client_id: String,
    api_key: String,
    token: TokenCache,
}

impl AirwallexClient {
    pub fn new(http: Client, api_base: String, client_id: String, api_key: String) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id,
            api_key,
            token: TokenCache::new(),
        }
    }

    pub async fn token(&self) -> Result<String> {
        self.token
            .get_or_refresh(|| async {
                let response = self
                    .http
                    .post(format!("{}/authentication/login", self.api_base))
                    .header("x-client-id", &self.client_id)
                    .header("x-api-key", &self.api_key)
                    .json(&serde_json::json!({}))
                    .send()
                    .await?;
                let login: LoginResponse = read_json(PROVIDER, "login", response).await?;
                if login.token.is_empty() {
                    return Err(PaymentError::gateway(PROVIDER, "login", "empty token in response"));
                }

                // An unreadable expiry makes the token single use
                let expires_at = parse_expiry(&login.expires_at).unwrap_or_else(|| {
                    warn!("Airwallex returned unreadable token expiry: {}", login.expires_at);
                    Utc::now()
                });
                Ok(CachedToken::new(login.token, expires_at))
            })
            .await
    }

    async fn drop_rejected_token(&self, response: &Response) {
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Airwallex rejected the cached token");
            self.token.invalidate().await;
        }
    }

    pub async fn create_intent(&self, intent: &CreateIntent) -> Result<CreatedIntent> {
        let token = self.token().await?;
        let response = self
            .http
            .post(format!("{}/pa/payment_intents/create", self.api_base))
            .bearer_auth(token)
            .json(intent)
            .send()
            .await?;
        self.drop_rejected_token(&response).await;
        read_json(PROVIDER, "create payment intent", response).await
    }

    pub async fn intent_by_order_id(&self, order_id: &str) -> Result<Intent> {
        let token = self.token().await?;
        let response = self
            .http
            .get(format!("{}/pa/payment_intents/", self.api_base))
            .query(&[("merchant_order_id", order_id)])
            .bearer_auth(token)
            .send()
            .await?;
        self.drop_rejected_token(&response).await;
        let page: IntentPage = read_json(PROVIDER, "get payment intent", response).await?;
        debug!("Airwallex returned {} intents for {}", page.items.len(), order_id);

        page.items.into_iter().next().ok_or_else(|| {
            PaymentError::gateway(
                PROVIDER,
                "get payment intent",
                format!("no payment intent found for order id: {}", order_id),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_expiry_without_colon() {
        let parsed = parse_expiry("2024-05-01T10:00:00+0000").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_expiry_garbage() {
        assert!(parse_expiry("tomorrow").is_none());
    }

    #[test]
    fn test_attempt_status_ignores_empty() {
        let intent: Intent = serde_json::from_value(serde_json::json!({
            "id": "int_1",
            "status": "SUCCEEDED",
            "latest_payment_attempt": {"status": ""}
        }))
        .unwrap();
        assert_eq!(intent.attempt_status(), None);
    }
}
