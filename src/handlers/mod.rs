pub mod invoices;
pub mod metrics;
pub mod notify;
pub mod payments;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::error::PaymentError;

/// Error body returned by the JSON endpoints.
#[derive(Debug)]
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(error: PaymentError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn status_for(error: &PaymentError) -> StatusCode {
    match error {
        PaymentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PaymentError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        PaymentError::Decoding(_) | PaymentError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PaymentError::Gateway { .. } | PaymentError::Network(_) => StatusCode::BAD_GATEWAY,
        PaymentError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        PaymentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn health_handler() -> StatusCode {
    StatusCode::OK
}
