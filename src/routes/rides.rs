use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::handlers::ride_handlers::*;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_ride))
        .route("/", get(list_my_rides))
        .route("/available", get(list_open_rides))
        .route("/:id", get(get_ride))
        .route("/:id/accept", post(accept_ride))
        .route("/:id/arrive", post(mark_arrived))
        .route("/:id/complete", post(complete_ride))
        .route("/:id/rate", patch(rate_ride))
        .layer(middleware::from_fn(auth_middleware))
}
