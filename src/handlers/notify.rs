use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::handlers::status_for;
use crate::services::PaymentService;

/// Gateway callback. Answers with the provider's acknowledgement body so the
/// gateway stops retrying once the order is resolved.
pub async fn handle_notification(
    State(service): State<Arc<PaymentService>>,
    Path((provider, order_id)): Path<(String, String)>,
    body: Bytes,
) -> (StatusCode, String) {
    let outcome = service.notify(&provider, &body, &order_id).await;

    let (status, error) = match &outcome {
        Ok(result) => {
            info!("Callback for {} via {} resolved as {}", order_id, provider, result.payment_status);
            (StatusCode::OK, None)
        }
        Err(e) => (status_for(e), Some(e)),
    };

    match service.ack(&provider, error) {
        Ok(ack) => (status, ack),
        Err(e) => {
            error!("Callback for unknown provider {}: {}", provider, e);
            (status_for(&e), e.to_string())
        }
    }
}
