use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use md5::{Digest, Md5};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::error::{PaymentError, Result};
use crate::models::{InvoiceRequest, InvoiceType, NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus};
use crate::services::http_client::read_json;
use crate::services::provider::{plain_ack, PaymentProvider};
use crate::utils::money::to_trimmed_string;

const PROVIDER: &str = "gc";
const VERSION: &str = "1.4";
const CURRENCY: &str = "CNY";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GcConfig {
    /// Merchant number
    pub xmpch: String,
    pub secret_key: String,
    /// Gateway endpoint every operation is posted to
    pub host: String,
}

/// Signed request wrapper shared by every GC operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: String,
    pub xmpch: String,
    pub version: String,
    pub data: String,
    pub requesttime: String,
    pub sign: String,
}

impl Envelope {
    pub fn signed(op: &str, xmpch: &str, data: String, requesttime: String, secret: &str) -> Self {
        let sign = sign(&data, op, &requesttime, VERSION, xmpch, secret);
        Self {
            op: op.to_string(),
            xmpch: xmpch.to_string(),
            version: VERSION.to_string(),
            data,
            requesttime,
            sign,
        }
    }
}

/// Uppercase hex MD5 over the sorted fields with the secret appended.
pub fn sign(data: &str, op: &str, requesttime: &str, version: &str, xmpch: &str, secret: &str) -> String {
    let params = format!(
        "data={}&op={}&requesttime={}&version={}&xmpch={}{}",
        data, op, requesttime, version, xmpch, secret
    );
    hex::encode_upper(Md5::digest(params.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct EnvelopeResponse {
    #[serde(default)]
    return_code: String,
    #[serde(default)]
    return_msg: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Serialize)]
struct PayData<'a> {
    orderdate: String,
    orderno: &'a str,
    amount: String,
    xmpch: &'a str,
    body: &'a str,
    return_url: &'a str,
    notify_url: &'a str,
    payerid: &'a str,
    payername: &'a str,
    remark1: &'a str,
    remark2: &'a str,
}

#[derive(Debug, Deserialize)]
struct PayResult {
    #[serde(default)]
    payurl: String,
}

#[derive(Debug, Deserialize)]
struct CallbackData {
    #[serde(default)]
    orderno: String,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    orderstate: String,
}

#[derive(Debug, Serialize)]
struct InvoiceData<'a> {
    busno: &'a str,
    payername: &'a str,
    idnum: &'a str,
    payertype: &'a str,
    invoicetitle: &'a str,
    tin: &'a str,
    phone: &'a str,
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvoiceResult {
    #[serde(default)]
    state: String,
    #[serde(default)]
    url: String,
}

fn time_id() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

fn decode_data<T: DeserializeOwned>(data: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| PaymentError::Decoding(format!("gc data is not base64: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// The GC campus payment platform.
pub struct GcProvider {
    http: Client,
    xmpch: String,
    secret_key: String,
    host: String,
}

impl GcProvider {
    pub fn new(config: GcConfig, http: Client) -> Result<Self> {
        if config.xmpch.trim().is_empty() || config.secret_key.trim().is_empty() || config.host.trim().is_empty() {
            return Err(PaymentError::Config("gc merchant number, secret key and host are required".to_string()));
        }
        Ok(Self {
            http,
            xmpch: config.xmpch,
            secret_key: config.secret_key,
            host: config.host,
        })
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, op: &'static str, payload: &P) -> Result<R> {
        let data = STANDARD.encode(serde_json::to_vec(payload)?);
        let envelope = Envelope::signed(op, &self.xmpch, data, time_id(), &self.secret_key);

        let response = self
            .http
            .post(&self.host)
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(serde_json::to_string(&envelope)?)
            .send()
            .await?;
        let reply: EnvelopeResponse = read_json(PROVIDER, op, response).await?;
        if reply.return_code != "SUCCESS" {
            return Err(PaymentError::gateway(
                PROVIDER,
                op,
                format!("{}: {}", reply.return_code, reply.return_msg),
            ));
        }
        decode_data(&reply.data)
    }
}

#[async_trait]
impl PaymentProvider for GcProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request.validate()?;

        let payload = PayData {
            orderdate: time_id(),
            orderno: &request.payment_name,
            amount: to_trimmed_string(request.price),
            xmpch: &self.xmpch,
            body: &request.product_display_name,
            return_url: &request.return_url,
            notify_url: &request.notify_url,
            payerid: "",
            payername: "",
            remark1: &request.payer_name,
            remark2: &request.product_name,
        };
        let result: PayResult = self.call("OrderCreate", &payload).await?;
        info!("GC order {} created", request.payment_name);

        Ok(PaymentResponse {
            pay_url: result.payurl,
            order_id: request.payment_name.clone(),
            ..Default::default()
        })
    }

    async fn notify(&self, body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let fields: HashMap<String, String> = form_urlencoded::parse(body).into_owned().collect();
        let data = fields
            .get("data")
            .ok_or_else(|| PaymentError::Decoding("gc callback has no data field".to_string()))?;
        let callback: CallbackData = decode_data(data)?;

        if callback.orderstate != "1" {
            warn!("GC order {} reported state {}", callback.orderno, callback.orderstate);
            let mut result =
                NotificationResult::unmapped(order_id, format!("unexpected gc order state: {}", callback.orderstate));
            result.payment_name = callback.orderno;
            return Ok(result);
        }

        let mut result = NotificationResult::with_status(order_id, PaymentStatus::Paid);
        result.payment_name = callback.orderno;
        result.price = callback.amount;
        result.currency = CURRENCY.to_string();
        Ok(result)
    }

    async fn get_invoice(&self, request: &InvoiceRequest) -> Result<String> {
        let payertype = match request.invoice_type {
            InvoiceType::Organization => "1",
            InvoiceType::Individual => "0",
        };
        let payload = InvoiceData {
            busno: &request.payment_name,
            payername: &request.person_name,
            idnum: &request.person_id_card,
            payertype,
            invoicetitle: &request.invoice_title,
            tin: &request.invoice_tax_id,
            phone: &request.person_phone,
            email: &request.person_email,
        };
        let result: InvoiceResult = self.call("InvoiceEBillByOrder", &payload).await?;

        if result.state == "0" {
            return Err(PaymentError::gateway(PROVIDER, "InvoiceEBillByOrder", "invoice accepted, issuing in progress"));
        }
        if result.url.is_empty() {
            return Err(PaymentError::gateway(PROVIDER, "InvoiceEBillByOrder", "invoice URL is empty"));
        }
        Ok(result.url)
    }

    fn response_ack(&self, error: Option<&PaymentError>) -> String {
        plain_ack(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn provider(server: &ServerGuard) -> GcProvider {
        GcProvider::new(
            GcConfig {
                xmpch: "M100".to_string(),
                secret_key: "s3cret".to_string(),
                host: format!("{}/gateway", server.url()),
            },
            Client::new(),
        )
        .unwrap()
    }

    fn reply(data: serde_json::Value) -> String {
        json!({
            "op": "OrderCreate",
            "xmpch": "M100",
            "version": "1.4",
            "return_code": "SUCCESS",
            "return_msg": "",
            "data": STANDARD.encode(data.to_string()),
        })
        .to_string()
    }

    fn callback(data: serde_json::Value) -> Vec<u8> {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("op", "OrderNotify")
            .append_pair("xmpch", "M100")
            .append_pair("version", "1.4")
            .append_pair("data", &STANDARD.encode(data.to_string()))
            .append_pair("requesttime", "20240501120000")
            .append_pair("sign", "IGNORED")
            .finish()
            .into_bytes()
    }

    #[test]
    fn test_sign_is_uppercase_md5() {
        let a = sign("ZGF0YQ==", "OrderCreate", "20240501120000", "1.4", "M100", "s3cret");
        let b = sign("ZGF0YQ==", "OrderCreate", "20240501120000", "1.4", "M100", "s3cret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_ne!(a, sign("ZGF0YQ==", "OrderCreate", "20240501120000", "1.4", "M100", "other"));
    }

    #[test]
    fn test_sign_known_value() {
        // md5("data=&op=&requesttime=&version=&xmpch=")
        let expected = hex::encode_upper(Md5::digest(b"data=&op=&requesttime=&version=&xmpch="));
        assert_eq!(sign("", "", "", "", "", ""), expected);
    }

    #[test]
    fn test_missing_credentials() {
        let err = GcProvider::new(GcConfig::default(), Client::new()).err().unwrap();
        assert!(matches!(err, PaymentError::Config(_)));
    }

    #[tokio::test]
    async fn test_pay_posts_signed_envelope() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/gateway")
            .match_header("content-type", "text/plain;charset=UTF-8")
            .match_body(Matcher::PartialJson(json!({"op": "OrderCreate", "xmpch": "M100", "version": "1.4"})))
            .with_body(reply(json!({"jylsh": "J1", "amount": "12.5", "payurl": "https://gc.example/pay/J1"})))
            .create_async()
            .await;

        let request = PaymentRequest {
            payment_name: "order_9".to_string(),
            price: 12.5,
            ..Default::default()
        };
        let response = provider(&server).pay(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.pay_url, "https://gc.example/pay/J1");
        assert_eq!(response.order_id, "order_9");
    }

    #[tokio::test]
    async fn test_pay_rejected_by_gateway() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/gateway")
            .with_body(json!({"return_code": "FAIL", "return_msg": "bad sign", "data": ""}).to_string())
            .create_async()
            .await;

        let request = PaymentRequest {
            payment_name: "order_9".to_string(),
            price: 1.0,
            ..Default::default()
        };
        let err = provider(&server).pay(&request).await.unwrap_err();
        assert!(err.to_string().contains("FAIL: bad sign"));
    }

    #[tokio::test]
    async fn test_notify_paid_callback() {
        let server = Server::new_async().await;
        let body = callback(json!({"orderno": "order_9", "amount": 12.5, "orderstate": "1"}));

        let result = provider(&server).notify(&body, "order_9").await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Paid);
        assert_eq!(result.payment_name, "order_9");
        assert_eq!(result.price, 12.5);
        assert_eq!(result.currency, "CNY");
    }

    #[tokio::test]
    async fn test_notify_other_state() {
        let server = Server::new_async().await;
        let body = callback(json!({"orderno": "order_9", "amount": 12.5, "orderstate": "2"}));

        let result = provider(&server).notify(&body, "order_9").await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Error);
        assert!(result.notify_message.unwrap().contains('2'));
    }

    #[tokio::test]
    async fn test_notify_without_data() {
        let server = Server::new_async().await;
        let err = provider(&server).notify(b"op=OrderNotify", "order_9").await.unwrap_err();
        assert!(matches!(err, PaymentError::Decoding(_)));
    }

    #[tokio::test]
    async fn test_invoice_states() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/gateway")
            .match_body(Matcher::PartialJson(json!({"op": "InvoiceEBillByOrder"})))
            .with_body(reply(json!({"busno": "order_9", "state": "1", "url": "https://gc.example/bill/1"})))
            .create_async()
            .await;

        let request = InvoiceRequest {
            payment_name: "order_9".to_string(),
            invoice_type: InvoiceType::Organization,
            ..Default::default()
        };
        let url = provider(&server).get_invoice(&request).await.unwrap();
        assert_eq!(url, "https://gc.example/bill/1");
    }

    #[tokio::test]
    async fn test_invoice_in_progress() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/gateway")
            .with_body(reply(json!({"busno": "order_9", "state": "0", "url": ""})))
            .create_async()
            .await;

        let err = provider(&server)
            .get_invoice(&InvoiceRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("in progress"));
    }
}
