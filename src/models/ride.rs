use chrono::{DateTime, Utc};
use mongodb::bson;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lifecycle of the physical trip. Independent of the payment axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Requested,
    Accepted,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Requested => "requested",
            TripStatus::Accepted => "accepted",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle of the settlement. `Paid` is terminal and exclusive; a ride may
/// return to `Pending` after `Failed` via a fresh initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub passenger_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,

    pub pickup_location: String,
    pub dropoff_location: String,
    pub fare: f64,

    pub status: TripStatus,
    pub driver_arrived: bool,

    pub payment_status: PaymentStatus,

    /// CheckoutRequestID of the live payment attempt. Kept after settlement
    /// as evidence; overwritten by a re-initiation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_correlation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpesa_receipt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn new(passenger_id: &str, pickup: &str, dropoff: &str, fare: f64) -> Self {
        let now = Utc::now();
        Ride {
            id: Some(ObjectId::new()),
            passenger_id: passenger_id.to_string(),
            driver_id: None,
            pickup_location: pickup.to_string(),
            dropoff_location: dropoff.to_string(),
            fare,
            status: TripStatus::Requested,
            driver_arrived: false,
            payment_status: PaymentStatus::Unpaid,
            payment_correlation_id: None,
            mpesa_receipt: None,
            rating: None,
            review: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id_hex(&self) -> String {
        self.id.as_ref().map(|id| id.to_hex()).unwrap_or_default()
    }
}

// ===== Request DTOs =====

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRideRequest {
    #[validate(length(min = 1, message = "pickup location is required"))]
    pub pickup_location: String,
    #[validate(length(min = 1, message = "dropoff location is required"))]
    pub dropoff_location: String,
    pub fare: f64,
}

#[derive(Debug, Deserialize)]
pub struct RateRideRequest {
    pub rating: i32,
    pub review: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    #[validate(length(min = 9, message = "phone number is required"))]
    pub phone: String,
}

// ===== Response DTOs =====

#[derive(Debug, Serialize)]
pub struct RideResponse {
    pub id: String,
    pub passenger_id: String,
    pub driver_id: Option<String>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub fare: f64,
    pub status: TripStatus,
    pub driver_arrived: bool,
    pub payment_status: PaymentStatus,
    pub mpesa_receipt: Option<String>,
    pub rating: Option<i32>,
    pub review: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Ride> for RideResponse {
    fn from(ride: Ride) -> Self {
        RideResponse {
            id: ride.id_hex(),
            passenger_id: ride.passenger_id,
            driver_id: ride.driver_id,
            pickup_location: ride.pickup_location,
            dropoff_location: ride.dropoff_location,
            fare: ride.fare,
            status: ride.status,
            driver_arrived: ride.driver_arrived,
            payment_status: ride.payment_status,
            mpesa_receipt: ride.mpesa_receipt,
            rating: ride.rating,
            review: ride.review,
            created_at: ride.created_at.to_rfc3339(),
            updated_at: ride.updated_at.to_rfc3339(),
        }
    }
}

/// Returned by a successful payment initiation; the STK prompt is on the
/// payer's handset and the outcome arrives later through the callback.
#[derive(Debug, Serialize)]
pub struct PaymentInitiatedResponse {
    pub ride_id: String,
    pub payment_status: PaymentStatus,
    pub checkout_request_id: String,
    pub customer_message: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub ride_id: String,
    pub payment_status: PaymentStatus,
    pub receipt: Option<String>,
}
