// handlers/payment_handlers.rs
use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::ride::{InitiatePaymentRequest, PaymentInitiatedResponse, PaymentStatusResponse};
use crate::models::user::Claims;
use crate::services::mpesa_service::MpesaCallback;
use crate::state::AppState;

pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<Json<PaymentInitiatedResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::invalid_input(e.to_string()))?;

    let payments = state.payments.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("M-Pesa service is not available".to_string())
    })?;

    let handle = payments.initiate(&id, &claims, &payload.phone).await?;
    Ok(Json(handle))
}

pub async fn payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<PaymentStatusResponse>> {
    let payments = state.payments.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("M-Pesa service is not available".to_string())
    })?;

    let status = payments.query(&id, &claims).await?;
    Ok(Json(status))
}

/// Gateway callback entry point. Unauthenticated by protocol; the gateway
/// must get an acknowledgment no matter what happened internally, or it
/// keeps retrying forever.
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Json(payload): Json<MpesaCallback>,
) -> Json<serde_json::Value> {
    let callback = payload.body.stk_callback;
    info!(
        "M-Pesa callback: {} result {}",
        callback.checkout_request_id, callback.result_code
    );

    match &state.payments {
        Some(payments) => payments.handle_callback(&callback).await,
        None => warn!(
            "Callback {} received but payments are not configured",
            callback.checkout_request_id
        ),
    }

    Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}
