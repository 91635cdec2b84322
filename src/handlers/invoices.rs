use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::handlers::ApiError;
use crate::models::InvoiceRequest;
use crate::services::PaymentService;

pub async fn create_invoice(
    State(service): State<Arc<PaymentService>>,
    Path(provider): Path<String>,
    Json(request): Json<InvoiceRequest>,
) -> Result<Json<Value>, ApiError> {
    let url = service.get_invoice(&provider, &request).await?;
    Ok(Json(json!({ "invoiceUrl": url })))
}
