pub mod airwallex;
pub mod alipay;
pub mod balance;
pub mod dummy;
pub mod gc;
pub mod paypal;
pub mod stripe;
pub mod wechat;

pub use airwallex::{AirwallexConfig, AirwallexProvider};
pub use alipay::{AlipayConfig, AlipayGateway, AlipayPageOrder, AlipayProvider, AlipayTrade};
pub use balance::BalanceProvider;
pub use dummy::DummyProvider;
pub use gc::{GcConfig, GcProvider};
pub use paypal::{PaypalConfig, PaypalProvider};
pub use stripe::{StripeConfig, StripeProvider};
pub use wechat::{JsapiPaySign, WechatPayConfig, WechatPayGateway, WechatPayProvider, WechatPrepay, WechatTransaction};
