use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::services::PaymentService;

pub async fn get_metrics(State(service): State<Arc<PaymentService>>) -> Json<Value> {
    let snapshot = service.metrics();
    let success_rate = if snapshot.pay_initiated > 0 {
        snapshot.pay_initiated.saturating_sub(snapshot.pay_failed) as f64 / snapshot.pay_initiated as f64 * 100.0
    } else {
        0.0
    };

    Json(json!({
        "providers": service.provider_names(),
        "counters": snapshot,
        "pay_success_rate": success_rate,
    }))
}
