use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PaymentError, Result};
use crate::models::{
    NotificationResult, PaymentEnv, PaymentRequest, PaymentResponse, PaymentStatus, StatusMapping,
};
use crate::services::provider::PaymentProvider;
use crate::utils::money::{from_minor_units, to_minor_units};
use crate::utils::{AttachLayout, Attachment};

const PROVIDER: &str = "wechat";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WechatPayConfig {
    pub mch_id: String,
    pub api_v3_key: String,
    pub app_id: String,
    /// Merchant certificate serial number
    pub serial_no: String,
    pub private_key: String,
}

impl WechatPayConfig {
    fn is_complete(&self) -> bool {
        [&self.mch_id, &self.api_v3_key, &self.app_id, &self.serial_no, &self.private_key]
            .iter()
            .all(|value| !value.trim().is_empty())
    }
}

/// Body of a v3 prepay call, shared by the JSAPI and native flows.
#[derive(Debug, Clone, PartialEq)]
pub struct WechatPrepay {
    pub app_id: String,
    pub description: String,
    pub attach: String,
    pub notify_url: String,
    pub out_trade_no: String,
    /// Minor units
    pub total: i64,
    pub currency: String,
    pub payer_openid: Option<String>,
}

/// Parameters handed to `WeixinJSBridge.invoke('getBrandWCPayRequest')`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsapiPaySign {
    pub app_id: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub pay_sign: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WechatTransaction {
    pub trade_state: String,
    pub out_trade_no: String,
    pub attach: String,
    /// Minor units
    pub total: i64,
    pub currency: String,
}

/// Signed WeChat Pay v3 calls. Implementations own RSA signing and platform
/// certificate handling.
#[async_trait]
pub trait WechatPayGateway: Send + Sync {
    /// Returns the prepay id.
    async fn jsapi_prepay(&self, order: &WechatPrepay) -> Result<String>;

    /// Returns the code URL rendered as a QR code.
    async fn native_prepay(&self, order: &WechatPrepay) -> Result<String>;

    fn sign_jsapi(&self, app_id: &str, prepay_id: &str) -> Result<JsapiPaySign>;

    async fn query_order(&self, out_trade_no: &str) -> Result<WechatTransaction>;
}

pub fn map_trade_state(state: &str) -> StatusMapping {
    match state {
        "SUCCESS" => Ok(PaymentStatus::Paid),
        "CLOSED" | "REVOKED" => Ok(PaymentStatus::Canceled),
        "NOTPAY" | "USERPAYING" => Ok(PaymentStatus::Created),
        "REFUND" => Err("wechat trade was refunded: REFUND".to_string()),
        "PAYERROR" => Err("wechat trade failed: PAYERROR".to_string()),
        other => Err(format!("unexpected wechat trade state: {}", other)),
    }
}

pub struct WechatPayProvider {
    gateway: Option<Arc<dyn WechatPayGateway>>,
    app_id: String,
}

impl WechatPayProvider {
    /// Missing credentials yield an unconfigured provider instead of an
    /// error. Its `pay` and `notify` fail with `NotConfigured`.
    pub fn new<F>(config: WechatPayConfig, connect: F) -> Result<Self>
    where
        F: FnOnce(&WechatPayConfig) -> Result<Arc<dyn WechatPayGateway>>,
    {
        if !config.is_complete() {
            warn!("WeChat Pay credentials incomplete, provider will reject payments");
            return Ok(Self {
                gateway: None,
                app_id: config.app_id,
            });
        }

        let gateway = connect(&config)?;
        Ok(Self {
            gateway: Some(gateway),
            app_id: config.app_id,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_some()
    }

    fn gateway(&self) -> Result<&Arc<dyn WechatPayGateway>> {
        self.gateway.as_ref().ok_or(PaymentError::NotConfigured(PROVIDER))
    }
}

#[async_trait]
impl PaymentProvider for WechatPayProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn pay(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        let gateway = self.gateway()?;
        request.validate()?;

        let mut order = WechatPrepay {
            app_id: self.app_id.clone(),
            description: request.product_display_name.clone(),
            attach: request.attachment().encode(AttachLayout::DisplayFirst),
            notify_url: request.notify_url.clone(),
            out_trade_no: request.payment_name.clone(),
            total: to_minor_units(request.price),
            currency: request.currency.clone(),
            payer_openid: None,
        };

        if request.payment_env != PaymentEnv::WechatBrowser {
            let code_url = gateway.native_prepay(&order).await?;
            info!("WeChat native order {} created", request.payment_name);
            return Ok(PaymentResponse {
                pay_url: code_url,
                order_id: request.payment_name.clone(),
                ..Default::default()
            });
        }

        if request.payer_id.is_empty() {
            return Err(PaymentError::InvalidRequest(
                "failed to get the payer's openid, please retry login".to_string(),
            ));
        }
        order.payer_openid = Some(request.payer_id.clone());

        let prepay_id = gateway.jsapi_prepay(&order).await?;
        let sign = gateway.sign_jsapi(&self.app_id, &prepay_id)?;
        info!("WeChat JSAPI order {} created", request.payment_name);

        let attach_info = HashMap::from([
            ("appId".to_string(), json!(sign.app_id)),
            ("timeStamp".to_string(), json!(sign.time_stamp)),
            ("nonceStr".to_string(), json!(sign.nonce_str)),
            ("package".to_string(), json!(sign.package)),
            ("signType".to_string(), json!("RSA")),
            ("paySign".to_string(), json!(sign.pay_sign)),
        ]);
        Ok(PaymentResponse {
            pay_url: String::new(),
            order_id: request.payment_name.clone(),
            attach_info,
        })
    }

    async fn notify(&self, _body: &[u8], order_id: &str) -> Result<NotificationResult> {
        let transaction = self.gateway()?.query_order(order_id).await?;

        let mapping = map_trade_state(&transaction.trade_state);
        if mapping != Ok(PaymentStatus::Paid) {
            if let Err(message) = &mapping {
                warn!("WeChat order {}: {}", order_id, message);
            }
            let mut result = NotificationResult::from_mapping(order_id, mapping);
            result.payment_name = order_id.to_string();
            return Ok(result);
        }

        let mut result = NotificationResult::with_status(order_id, PaymentStatus::Paid)
            .with_attachment(Attachment::decode_lenient(&transaction.attach, AttachLayout::DisplayFirst));
        result.payment_name = transaction.out_trade_no;
        result.price = from_minor_units(transaction.total);
        result.currency = transaction.currency;
        Ok(result)
    }

    fn response_ack(&self, error: Option<&PaymentError>) -> String {
        match error {
            None => json!({"code": "SUCCESS", "message": ""}).to_string(),
            Some(e) => json!({"code": "FAIL", "message": e.to_string()}).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvoiceRequest;
    use rstest::rstest;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockGateway {
        prepaid: RwLock<Vec<WechatPrepay>>,
        transaction: RwLock<WechatTransaction>,
    }

    #[async_trait]
    impl WechatPayGateway for MockGateway {
        async fn jsapi_prepay(&self, order: &WechatPrepay) -> Result<String> {
            self.prepaid.write().await.push(order.clone());
            Ok("wx201410272009395522657a690389285100".to_string())
        }

        async fn native_prepay(&self, order: &WechatPrepay) -> Result<String> {
            self.prepaid.write().await.push(order.clone());
            Ok("weixin://wxpay/bizpayurl?pr=abc".to_string())
        }

        fn sign_jsapi(&self, app_id: &str, prepay_id: &str) -> Result<JsapiPaySign> {
            Ok(JsapiPaySign {
                app_id: app_id.to_string(),
                time_stamp: "1414561699".to_string(),
                nonce_str: "5K8264ILTKCH16CQ2502SI8ZNMTM67VS".to_string(),
                package: format!("prepay_id={}", prepay_id),
                pay_sign: "signed".to_string(),
            })
        }

        async fn query_order(&self, _out_trade_no: &str) -> Result<WechatTransaction> {
            Ok(self.transaction.read().await.clone())
        }
    }

    fn config() -> WechatPayConfig {
        WechatPayConfig {
            mch_id: "1900000109".to_string(),
            api_v3_key: "v3key".to_string(),
            app_id: "wxd678efh567hg6787".to_string(),
            serial_no: "5157F09EFDC096DE15EBE81A47057A72".to_string(),
            private_key: "pem".to_string(),
        }
    }

    fn provider(gateway: Arc<MockGateway>) -> WechatPayProvider {
        WechatPayProvider::new(config(), move |_| Ok(gateway as Arc<dyn WechatPayGateway>)).unwrap()
    }

    fn request(env: PaymentEnv, payer_id: &str) -> PaymentRequest {
        PaymentRequest {
            provider_name: "wx".to_string(),
            product_name: "gold".to_string(),
            product_display_name: "Gold Plan".to_string(),
            payer_id: payer_id.to_string(),
            payment_name: "order_8".to_string(),
            price: 0.5,
            currency: "CNY".to_string(),
            payment_env: env,
            ..Default::default()
        }
    }

    #[rstest]
    #[case("SUCCESS", PaymentStatus::Paid)]
    #[case("CLOSED", PaymentStatus::Canceled)]
    #[case("REVOKED", PaymentStatus::Canceled)]
    #[case("NOTPAY", PaymentStatus::Created)]
    #[case("USERPAYING", PaymentStatus::Created)]
    fn test_trade_states(#[case] state: &str, #[case] expected: PaymentStatus) {
        assert_eq!(map_trade_state(state), Ok(expected));
    }

    #[rstest]
    #[case("REFUND", "refunded")]
    #[case("PAYERROR", "failed")]
    #[case("FOO_BAR", "unexpected")]
    fn test_error_states(#[case] state: &str, #[case] fragment: &str) {
        let message = map_trade_state(state).unwrap_err();
        assert!(message.contains(fragment), "{message}");
        assert!(message.contains(state), "{message}");
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let provider = WechatPayProvider::new(WechatPayConfig::default(), |_| {
            panic!("connector must not run without credentials")
        })
        .unwrap();

        assert!(!provider.is_configured());
        let err = provider.pay(&request(PaymentEnv::Standard, "")).await.unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured("wechat")));
        assert!(provider.notify(b"", "order_8").await.is_err());
        assert_eq!(provider.get_invoice(&InvoiceRequest::default()).await.unwrap(), "");
        assert!(provider.response_ack(None).contains("SUCCESS"));
    }

    #[tokio::test]
    async fn test_native_flow_returns_code_url() {
        let gateway = Arc::new(MockGateway::default());
        let response = provider(gateway.clone())
            .pay(&request(PaymentEnv::Standard, ""))
            .await
            .unwrap();

        assert_eq!(response.pay_url, "weixin://wxpay/bizpayurl?pr=abc");
        assert_eq!(response.order_id, "order_8");
        let prepaid = gateway.prepaid.read().await;
        assert_eq!(prepaid[0].total, 50);
        assert_eq!(prepaid[0].attach, "Gold Plan|gold|wx");
        assert_eq!(prepaid[0].payer_openid, None);
    }

    #[tokio::test]
    async fn test_jsapi_flow_returns_sign() {
        let gateway = Arc::new(MockGateway::default());
        let response = provider(gateway)
            .pay(&request(PaymentEnv::WechatBrowser, "oxW9O1ZDvgreSHuBSQDiQ2F055PI"))
            .await
            .unwrap();

        assert_eq!(response.pay_url, "");
        assert_eq!(response.attach_info["signType"], "RSA");
        assert_eq!(response.attach_info["appId"], "wxd678efh567hg6787");
        assert_eq!(
            response.attach_info["package"],
            "prepay_id=wx201410272009395522657a690389285100"
        );
    }

    #[tokio::test]
    async fn test_jsapi_requires_openid() {
        let err = provider(Arc::new(MockGateway::default()))
            .pay(&request(PaymentEnv::WechatBrowser, ""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("openid"));
    }

    #[tokio::test]
    async fn test_notify_paid() {
        let gateway = Arc::new(MockGateway::default());
        *gateway.transaction.write().await = WechatTransaction {
            trade_state: "SUCCESS".to_string(),
            out_trade_no: "order_8".to_string(),
            attach: "Gold Plan|gold|wx".to_string(),
            total: 50,
            currency: "CNY".to_string(),
        };

        let result = provider(gateway).notify(b"", "order_8").await.unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Paid);
        assert_eq!(result.product_name, "gold");
        assert_eq!(result.product_display_name, "Gold Plan");
        assert_eq!(result.price, 0.5);
    }

    #[test]
    fn test_json_ack() {
        let provider = provider(Arc::new(MockGateway::default()));
        let ok: serde_json::Value = serde_json::from_str(&provider.response_ack(None)).unwrap();
        assert_eq!(ok["code"], "SUCCESS");

        let err = PaymentError::Decoding("bad body".to_string());
        let fail: serde_json::Value = serde_json::from_str(&provider.response_ack(Some(&err))).unwrap();
        assert_eq!(fail["code"], "FAIL");
        assert!(fail["message"].as_str().unwrap().contains("bad body"));
    }
}
