//! End-to-end ride and payment flows over the in-memory store and a
//! scripted gateway, driven through the service layer the handlers call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use liftmate_api::errors::{AppError, Result};
use liftmate_api::models::ride::{CreateRideRequest, PaymentStatus, TripStatus};
use liftmate_api::models::user::{Claims, Role};
use liftmate_api::services::mpesa_service::{PaymentGateway, StkCallback, StkPushResponse};
use liftmate_api::services::payment_service::PaymentService;
use liftmate_api::services::ride_service::RideService;
use liftmate_api::store::memory::{MemoryDriverDirectory, MemoryRideStore};

struct ScriptedGateway {
    calls: AtomicUsize,
}

impl ScriptedGateway {
    fn new() -> Self {
        ScriptedGateway {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn stk_push(
        &self,
        _phone: &str,
        _amount: f64,
        _account_reference: &str,
        _desc: &str,
    ) -> Result<StkPushResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StkPushResponse {
            merchant_request_id: format!("29115-34620561-{}", n),
            checkout_request_id: format!("ws_CO_191220191020363925-{}", n),
            response_code: "0".to_string(),
            response_description: "Success. Request accepted for processing".to_string(),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }
}

struct Harness {
    rides: RideService,
    payments: PaymentService,
    directory: MemoryDriverDirectory,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryRideStore::new());
    let directory = MemoryDriverDirectory::new();
    let rides = RideService::new(store.clone(), Arc::new(directory.clone()));
    let payments = PaymentService::new(store, Arc::new(ScriptedGateway::new()));
    Harness {
        rides,
        payments,
        directory,
    }
}

fn passenger(id: &str) -> Claims {
    Claims {
        sub: id.to_string(),
        name: format!("Passenger {}", id),
        phone: "0712345678".to_string(),
        role: Role::Passenger,
        exp: 2_000_000_000,
    }
}

fn driver(id: &str) -> Claims {
    Claims {
        sub: id.to_string(),
        name: format!("Driver {}", id),
        phone: "0700000000".to_string(),
        role: Role::Driver,
        exp: 2_000_000_000,
    }
}

fn success_callback(correlation_id: &str, receipt: &str, amount: f64) -> StkCallback {
    serde_json::from_value(serde_json::json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": correlation_id,
        "ResultCode": 0,
        "ResultDesc": "The service request is processed successfully.",
        "CallbackMetadata": {
            "Item": [
                { "Name": "Amount", "Value": amount },
                { "Name": "MpesaReceiptNumber", "Value": receipt },
                { "Name": "TransactionDate", "Value": 20250829104532u64 },
                { "Name": "PhoneNumber", "Value": 254712345678u64 }
            ]
        }
    }))
    .unwrap()
}

fn failure_callback(correlation_id: &str, desc: &str) -> StkCallback {
    serde_json::from_value(serde_json::json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": correlation_id,
        "ResultCode": 1,
        "ResultDesc": desc,
    }))
    .unwrap()
}

async fn create_ride(h: &Harness, passenger_id: &str, fare: f64) -> String {
    let req = CreateRideRequest {
        pickup_location: "JKIA Terminal 1A".to_string(),
        dropoff_location: "Westlands, Nairobi".to_string(),
        fare,
    };
    h.rides
        .create(&passenger(passenger_id), &req)
        .await
        .unwrap()
        .id_hex()
}

// Scenario A: two drivers race for one requested ride; one wins, the loser
// sees a "no longer available" outcome, and the winner is bound.
#[tokio::test]
async fn two_drivers_race_for_one_ride() {
    let h = Arc::new(harness());
    let ride_id = create_ride(&h, "p1", 500.0).await;

    let hx = Arc::clone(&h);
    let id_x = ride_id.clone();
    let x = tokio::spawn(async move { hx.rides.accept(&id_x, &driver("driver-x")).await });
    let hy = Arc::clone(&h);
    let id_y = ride_id.clone();
    let y = tokio::spawn(async move { hy.rides.accept(&id_y, &driver("driver-y")).await });

    let results = [x.await.unwrap(), y.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let losses = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::RideNotAvailable)))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(losses, 1);

    let ride = h.rides.get(&ride_id).await.unwrap();
    assert_eq!(ride.status, TripStatus::Accepted);
    let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
    assert_eq!(ride.driver_id, winner.driver_id);
}

// Scenario B: full happy path through payment, with a duplicate success
// callback after settlement.
#[tokio::test]
async fn ride_is_paid_exactly_once() {
    let h = harness();
    let ride_id = create_ride(&h, "p1", 500.0).await;

    h.rides.accept(&ride_id, &driver("d1")).await.unwrap();
    h.rides.mark_arrived(&ride_id, &driver("d1")).await.unwrap();
    let completed = h.rides.complete(&ride_id, &driver("d1")).await.unwrap();
    assert_eq!(completed.status, TripStatus::Completed);
    assert_eq!(h.directory.is_available("d1"), Some(true));

    let handle = h
        .payments
        .initiate(&ride_id, &passenger("p1"), "0712345678")
        .await
        .unwrap();
    assert_eq!(handle.payment_status, PaymentStatus::Pending);

    let callback = success_callback(&handle.checkout_request_id, "QAE123", 500.0);
    h.payments.handle_callback(&callback).await;

    let status = h.payments.query(&ride_id, &passenger("p1")).await.unwrap();
    assert_eq!(status.payment_status, PaymentStatus::Paid);
    assert_eq!(status.receipt.as_deref(), Some("QAE123"));

    // At-least-once delivery: an identical redelivery changes nothing.
    h.payments.handle_callback(&callback).await;
    let status = h.payments.query(&ride_id, &passenger("p1")).await.unwrap();
    assert_eq!(status.payment_status, PaymentStatus::Paid);
    assert_eq!(status.receipt.as_deref(), Some("QAE123"));

    // The assigned driver may read payment status too.
    let as_driver = h.payments.query(&ride_id, &driver("d1")).await.unwrap();
    assert_eq!(as_driver.payment_status, PaymentStatus::Paid);
}

// Scenario C: first attempt fails at the gateway, a retry gets a fresh
// correlation token and settles.
#[tokio::test]
async fn failed_payment_can_be_retried() {
    let h = harness();
    let ride_id = create_ride(&h, "p1", 500.0).await;
    h.rides.accept(&ride_id, &driver("d1")).await.unwrap();
    h.rides.complete(&ride_id, &passenger("p1")).await.unwrap();

    let first = h
        .payments
        .initiate(&ride_id, &passenger("p1"), "0712345678")
        .await
        .unwrap();
    h.payments
        .handle_callback(&failure_callback(&first.checkout_request_id, "insufficient funds"))
        .await;
    let status = h.payments.query(&ride_id, &passenger("p1")).await.unwrap();
    assert_eq!(status.payment_status, PaymentStatus::Failed);

    let second = h
        .payments
        .initiate(&ride_id, &passenger("p1"), "0712345678")
        .await
        .unwrap();
    assert_ne!(second.checkout_request_id, first.checkout_request_id);

    h.payments
        .handle_callback(&success_callback(&second.checkout_request_id, "QAE456", 500.0))
        .await;
    let status = h.payments.query(&ride_id, &passenger("p1")).await.unwrap();
    assert_eq!(status.payment_status, PaymentStatus::Paid);
    assert_eq!(status.receipt.as_deref(), Some("QAE456"));
}

#[tokio::test]
async fn trip_and_payment_axes_stay_independent() {
    let h = harness();
    let ride_id = create_ride(&h, "p1", 750.0).await;
    h.rides.accept(&ride_id, &driver("d1")).await.unwrap();

    // Pay before the trip finishes; the trip axis is untouched.
    let handle = h
        .payments
        .initiate(&ride_id, &passenger("p1"), "0712345678")
        .await
        .unwrap();
    h.payments
        .handle_callback(&success_callback(&handle.checkout_request_id, "QAE789", 750.0))
        .await;

    let ride = h.rides.get(&ride_id).await.unwrap();
    assert_eq!(ride.status, TripStatus::Accepted);
    assert_eq!(ride.payment_status, PaymentStatus::Paid);

    // Completing afterwards leaves the settlement alone.
    let completed = h.rides.complete(&ride_id, &driver("d1")).await.unwrap();
    assert_eq!(completed.status, TripStatus::Completed);
    assert_eq!(completed.payment_status, PaymentStatus::Paid);
    assert_eq!(completed.mpesa_receipt.as_deref(), Some("QAE789"));
}

#[tokio::test]
async fn stranger_cannot_read_payment_status() {
    let h = harness();
    let ride_id = create_ride(&h, "p1", 500.0).await;
    h.rides.accept(&ride_id, &driver("d1")).await.unwrap();

    let result = h.payments.query(&ride_id, &driver("d2")).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
    let result = h.payments.query(&ride_id, &passenger("p2")).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}
