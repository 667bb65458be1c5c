// handlers/ride_handlers.rs
use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::ride::{CreateRideRequest, RateRideRequest, RideResponse};
use crate::models::user::Claims;
use crate::state::AppState;

pub async fn create_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateRideRequest>,
) -> Result<Json<RideResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::invalid_input(e.to_string()))?;

    let ride = state.rides.create(&claims, &payload).await?;
    Ok(Json(RideResponse::from(ride)))
}

pub async fn get_ride(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>> {
    let ride = state.rides.get(&id).await?;
    Ok(Json(RideResponse::from(ride)))
}

pub async fn list_my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<RideResponse>>> {
    let rides = state.rides.list_for_passenger(&claims.sub).await?;
    Ok(Json(rides.into_iter().map(RideResponse::from).collect()))
}

pub async fn list_open_rides(
    State(state): State<AppState>,
) -> Result<Json<Vec<RideResponse>>> {
    let rides = state.rides.list_open().await?;
    Ok(Json(rides.into_iter().map(RideResponse::from).collect()))
}

pub async fn accept_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>> {
    let ride = state.rides.accept(&id, &claims).await?;
    Ok(Json(RideResponse::from(ride)))
}

pub async fn mark_arrived(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>> {
    let ride = state.rides.mark_arrived(&id, &claims).await?;
    Ok(Json(RideResponse::from(ride)))
}

pub async fn complete_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>> {
    let ride = state.rides.complete(&id, &claims).await?;
    Ok(Json(RideResponse::from(ride)))
}

pub async fn rate_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<RateRideRequest>,
) -> Result<Json<RideResponse>> {
    let ride = state
        .rides
        .rate(&id, &claims, payload.rating, payload.review.as_deref())
        .await?;
    Ok(Json(RideResponse::from(ride)))
}
