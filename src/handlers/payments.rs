use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;
use tracing::info;

use crate::handlers::ApiError;
use crate::models::{NotificationResult, PaymentRequest, PaymentResponse};
use crate::services::PaymentService;

pub async fn create_payment(
    State(service): State<Arc<PaymentService>>,
    Path(provider): Path<String>,
    Json(mut request): Json<PaymentRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    info!("Received payment request {} for {}", request.payment_name, provider);

    if request.provider_name.is_empty() {
        request.provider_name = provider.clone();
    }
    let response = service.pay(&provider, &request).await?;
    Ok(Json(response))
}

/// Polls the gateway for the current state of an order.
pub async fn payment_status(
    State(service): State<Arc<PaymentService>>,
    Path((provider, order_id)): Path<(String, String)>,
) -> Result<Json<NotificationResult>, ApiError> {
    let result = service.notify(&provider, &[], &order_id).await?;
    Ok(Json(result))
}
