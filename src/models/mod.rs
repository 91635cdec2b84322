pub mod invoice;
pub mod payment;

pub use invoice::{InvoiceRequest, InvoiceType};
pub use payment::{
    NotificationResult, PaymentEnv, PaymentRequest, PaymentResponse, PaymentStatus, StatusMapping,
};
