//! Provider-agnostic online payments: one trait over Stripe, PayPal,
//! Alipay, WeChat Pay, Airwallex, GC and two local providers, with a
//! registry and an HTTP surface on top.

pub mod app;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{PaymentError, Result};
pub use models::{NotificationResult, PaymentRequest, PaymentResponse, PaymentStatus};
pub use services::{GatewayConnectors, PaymentProvider, PaymentService, ProviderRegistry};
