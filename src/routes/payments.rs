use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::payment_handlers;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/:id/initiate", post(payment_handlers::initiate_payment))
        .route("/:id/status", get(payment_handlers::payment_status))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", get(payments_health))
        // Called by the gateway, not by users; no auth layer.
        .route("/callback", post(payment_handlers::mpesa_callback))
        .merge(protected)
}

async fn payments_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "payments",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
