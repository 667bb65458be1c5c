//! In-memory `RideStore` for tests and local development, mirroring the CAS
//! semantics of the Mongo store: every transition checks and writes under a
//! single write-lock acquisition.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;

use crate::errors::Result;
use crate::models::ride::{PaymentStatus, Ride, TripStatus};
use crate::store::{DriverDirectory, RideStore};

#[derive(Clone, Default)]
pub struct MemoryRideStore {
    rides: Arc<RwLock<HashMap<String, Ride>>>,
}

impl MemoryRideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RideStore for MemoryRideStore {
    async fn insert(&self, mut ride: Ride) -> Result<Ride> {
        if ride.id.is_none() {
            ride.id = Some(ObjectId::new());
        }
        let mut rides = self.rides.write().expect("lock poisoned");
        rides.insert(ride.id_hex(), ride.clone());
        Ok(ride)
    }

    async fn find(&self, ride_id: &str) -> Result<Option<Ride>> {
        let rides = self.rides.read().expect("lock poisoned");
        Ok(rides.get(ride_id).cloned())
    }

    async fn find_by_correlation(&self, correlation_id: &str) -> Result<Option<Ride>> {
        let rides = self.rides.read().expect("lock poisoned");
        Ok(rides
            .values()
            .find(|r| r.payment_correlation_id.as_deref() == Some(correlation_id))
            .cloned())
    }

    async fn list_for_passenger(&self, passenger_id: &str) -> Result<Vec<Ride>> {
        let rides = self.rides.read().expect("lock poisoned");
        let mut out: Vec<Ride> = rides
            .values()
            .filter(|r| r.passenger_id == passenger_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_open(&self) -> Result<Vec<Ride>> {
        let rides = self.rides.read().expect("lock poisoned");
        let mut out: Vec<Ride> = rides
            .values()
            .filter(|r| r.status == TripStatus::Requested)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn try_accept(&self, ride_id: &str, driver_id: &str) -> Result<Option<Ride>> {
        let mut rides = self.rides.write().expect("lock poisoned");
        match rides.get_mut(ride_id) {
            Some(ride) if ride.status == TripStatus::Requested => {
                ride.status = TripStatus::Accepted;
                ride.driver_id = Some(driver_id.to_string());
                ride.updated_at = Utc::now();
                Ok(Some(ride.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_arrived(&self, ride_id: &str) -> Result<Option<Ride>> {
        let mut rides = self.rides.write().expect("lock poisoned");
        match rides.get_mut(ride_id) {
            Some(ride) => {
                ride.driver_arrived = true;
                ride.updated_at = Utc::now();
                Ok(Some(ride.clone()))
            }
            None => Ok(None),
        }
    }

    async fn try_complete(&self, ride_id: &str) -> Result<Option<Ride>> {
        let mut rides = self.rides.write().expect("lock poisoned");
        match rides.get_mut(ride_id) {
            Some(ride) if ride.status == TripStatus::Accepted => {
                ride.status = TripStatus::Completed;
                ride.updated_at = Utc::now();
                Ok(Some(ride.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_rating(
        &self,
        ride_id: &str,
        rating: i32,
        review: Option<&str>,
    ) -> Result<Option<Ride>> {
        let mut rides = self.rides.write().expect("lock poisoned");
        match rides.get_mut(ride_id) {
            Some(ride) => {
                ride.rating = Some(rating);
                if let Some(review) = review {
                    ride.review = Some(review.to_string());
                }
                ride.updated_at = Utc::now();
                Ok(Some(ride.clone()))
            }
            None => Ok(None),
        }
    }

    async fn begin_payment(&self, ride_id: &str, correlation_id: &str) -> Result<Option<Ride>> {
        let mut rides = self.rides.write().expect("lock poisoned");
        match rides.get_mut(ride_id) {
            Some(ride) if ride.payment_status != PaymentStatus::Paid => {
                ride.payment_status = PaymentStatus::Pending;
                ride.payment_correlation_id = Some(correlation_id.to_string());
                ride.updated_at = Utc::now();
                Ok(Some(ride.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn settle_success(&self, correlation_id: &str, receipt: &str) -> Result<Option<Ride>> {
        let mut rides = self.rides.write().expect("lock poisoned");
        let ride = rides.values_mut().find(|r| {
            r.payment_correlation_id.as_deref() == Some(correlation_id)
                && r.payment_status != PaymentStatus::Paid
        });
        match ride {
            Some(ride) => {
                ride.payment_status = PaymentStatus::Paid;
                ride.mpesa_receipt = Some(receipt.to_string());
                ride.updated_at = Utc::now();
                Ok(Some(ride.clone()))
            }
            None => Ok(None),
        }
    }

    async fn settle_failure(&self, correlation_id: &str) -> Result<Option<Ride>> {
        let mut rides = self.rides.write().expect("lock poisoned");
        let ride = rides.values_mut().find(|r| {
            r.payment_correlation_id.as_deref() == Some(correlation_id)
                && r.payment_status != PaymentStatus::Paid
        });
        match ride {
            Some(ride) => {
                ride.payment_status = PaymentStatus::Failed;
                ride.updated_at = Utc::now();
                Ok(Some(ride.clone()))
            }
            None => Ok(None),
        }
    }
}

/// In-memory driver availability, exposed for assertions in tests.
#[derive(Clone, Default)]
pub struct MemoryDriverDirectory {
    available: Arc<RwLock<HashMap<String, bool>>>,
}

impl MemoryDriverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self, driver_id: &str) -> Option<bool> {
        let available = self.available.read().expect("lock poisoned");
        available.get(driver_id).copied()
    }
}

#[async_trait]
impl DriverDirectory for MemoryDriverDirectory {
    async fn set_available(&self, driver_id: &str, available: bool) -> Result<()> {
        let mut map = self.available.write().expect("lock poisoned");
        map.insert(driver_id.to_string(), available);
        Ok(())
    }
}
