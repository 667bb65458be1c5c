// services/ride_service.rs
use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::{AppError, Result};
use crate::models::ride::{CreateRideRequest, Ride, TripStatus};
use crate::models::user::Claims;
use crate::store::{DriverDirectory, RideStore};

/// Trip-axis state machine: requested -> accepted -> completed, with every
/// transition a single conditional update in the store. Cancellation is in
/// the model but has no operation yet.
#[derive(Clone)]
pub struct RideService {
    rides: Arc<dyn RideStore>,
    drivers: Arc<dyn DriverDirectory>,
}

impl RideService {
    pub fn new(rides: Arc<dyn RideStore>, drivers: Arc<dyn DriverDirectory>) -> Self {
        RideService { rides, drivers }
    }

    pub async fn create(&self, claims: &Claims, req: &CreateRideRequest) -> Result<Ride> {
        let pickup = req.pickup_location.trim();
        let dropoff = req.dropoff_location.trim();
        if pickup.is_empty() || dropoff.is_empty() {
            return Err(AppError::invalid_input(
                "pickup and dropoff locations are required",
            ));
        }
        if !(req.fare > 0.0) {
            return Err(AppError::invalid_input("fare must be greater than 0"));
        }

        let ride = self
            .rides
            .insert(Ride::new(&claims.sub, pickup, dropoff, req.fare))
            .await?;
        info!("Ride {} requested by passenger {}", ride.id_hex(), claims.sub);
        Ok(ride)
    }

    /// Exactly one of any number of concurrent accepts wins; the rest see
    /// `RideNotAvailable`, which is a normal racing outcome and not logged
    /// as an error.
    pub async fn accept(&self, ride_id: &str, claims: &Claims) -> Result<Ride> {
        if !claims.is_driver() {
            return Err(AppError::Forbidden);
        }

        match self.rides.try_accept(ride_id, &claims.sub).await? {
            Some(ride) => {
                info!("Ride {} accepted by driver {}", ride_id, claims.sub);
                Ok(ride)
            }
            None => match self.rides.find(ride_id).await? {
                Some(_) => {
                    info!("Driver {} lost the accept race for ride {}", claims.sub, ride_id);
                    Err(AppError::RideNotAvailable)
                }
                None => Err(AppError::RideNotFound),
            },
        }
    }

    /// Idempotent: the flag is monotonic, a second call is a no-op success.
    pub async fn mark_arrived(&self, ride_id: &str, claims: &Claims) -> Result<Ride> {
        let ride = self
            .rides
            .find(ride_id)
            .await?
            .ok_or(AppError::RideNotFound)?;

        if ride.driver_id.as_deref() != Some(claims.sub.as_str()) {
            return Err(AppError::Forbidden);
        }
        if ride.driver_arrived {
            return Ok(ride);
        }

        self.rides
            .set_arrived(ride_id)
            .await?
            .ok_or(AppError::RideNotFound)
    }

    /// Either party may complete. Completing an already-completed ride
    /// returns the current state. The availability flip happens after the
    /// transition commits; if it fails the transition stands and the flip is
    /// left to be retried out of band.
    pub async fn complete(&self, ride_id: &str, claims: &Claims) -> Result<Ride> {
        let ride = self
            .rides
            .find(ride_id)
            .await?
            .ok_or(AppError::RideNotFound)?;

        let caller = claims.sub.as_str();
        if ride.passenger_id != caller && ride.driver_id.as_deref() != Some(caller) {
            return Err(AppError::Forbidden);
        }
        if ride.status == TripStatus::Completed {
            return Ok(ride);
        }

        match self.rides.try_complete(ride_id).await? {
            Some(completed) => {
                info!("Ride {} completed", ride_id);
                if let Some(driver_id) = &completed.driver_id {
                    if let Err(e) = self.drivers.set_available(driver_id, true).await {
                        warn!(
                            "Ride {} completed but availability flip for driver {} failed: {}",
                            ride_id, driver_id, e
                        );
                    }
                }
                Ok(completed)
            }
            None => {
                // Lost a race or the ride was never accepted; re-read to tell
                // the idempotent case apart.
                let current = self
                    .rides
                    .find(ride_id)
                    .await?
                    .ok_or(AppError::RideNotFound)?;
                if current.status == TripStatus::Completed {
                    Ok(current)
                } else {
                    Err(AppError::RideNotAvailable)
                }
            }
        }
    }

    /// Passenger only. Deliberately not gated on trip status.
    pub async fn rate(
        &self,
        ride_id: &str,
        claims: &Claims,
        rating: i32,
        review: Option<&str>,
    ) -> Result<Ride> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::invalid_input("rating must be between 1 and 5"));
        }

        let ride = self
            .rides
            .find(ride_id)
            .await?
            .ok_or(AppError::RideNotFound)?;
        if ride.passenger_id != claims.sub {
            return Err(AppError::Forbidden);
        }

        self.rides
            .set_rating(ride_id, rating, review)
            .await?
            .ok_or(AppError::RideNotFound)
    }

    pub async fn get(&self, ride_id: &str) -> Result<Ride> {
        self.rides
            .find(ride_id)
            .await?
            .ok_or(AppError::RideNotFound)
    }

    pub async fn list_for_passenger(&self, passenger_id: &str) -> Result<Vec<Ride>> {
        self.rides.list_for_passenger(passenger_id).await
    }

    pub async fn list_open(&self) -> Result<Vec<Ride>> {
        self.rides.list_open().await
    }
}
