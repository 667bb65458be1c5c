// services/payment_service.rs
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::errors::{AppError, Result};
use crate::models::ride::{PaymentInitiatedResponse, PaymentStatus, PaymentStatusResponse, Ride};
use crate::models::user::Claims;
use crate::services::mpesa_service::{PaymentGateway, StkCallback};
use crate::store::RideStore;

const DEFAULT_STK_TIMEOUT: Duration = Duration::from_secs(30);

/// Payment initiation plus the asynchronous reconciliation of gateway
/// callbacks. The payment axis is independent of the trip axis; the only
/// coupling is through the ride document itself.
#[derive(Clone)]
pub struct PaymentService {
    rides: Arc<dyn RideStore>,
    gateway: Arc<dyn PaymentGateway>,
    stk_timeout: Duration,
}

impl PaymentService {
    pub fn new(rides: Arc<dyn RideStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        PaymentService {
            rides,
            gateway,
            stk_timeout: DEFAULT_STK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stk_timeout = timeout;
        self
    }

    /// Passenger-only. An already-paid ride is rejected before any gateway
    /// traffic. A timed-out initiation leaves the payment status untouched
    /// so the passenger can retry safely.
    pub async fn initiate(
        &self,
        ride_id: &str,
        claims: &Claims,
        phone: &str,
    ) -> Result<PaymentInitiatedResponse> {
        let ride = self
            .rides
            .find(ride_id)
            .await?
            .ok_or(AppError::RideNotFound)?;

        if ride.passenger_id != claims.sub {
            return Err(AppError::Forbidden);
        }
        if ride.payment_status == PaymentStatus::Paid {
            return Err(AppError::AlreadyPaid);
        }
        if phone.trim().is_empty() {
            return Err(AppError::invalid_input("phone number is required"));
        }

        // Ride id rides along in the account reference so the settlement can
        // be cross-checked even without the correlation token.
        let account_reference = format!("RIDE-{}", ride_id);
        let push = tokio::time::timeout(
            self.stk_timeout,
            self.gateway
                .stk_push(phone, ride.fare, &account_reference, "Payment for ride"),
        )
        .await
        .map_err(|_| AppError::GatewayTimeout)??;

        let updated = self
            .rides
            .begin_payment(ride_id, &push.checkout_request_id)
            .await?
            // The ride settled while the push was in flight.
            .ok_or(AppError::AlreadyPaid)?;

        info!(
            "Payment initiated for ride {} (correlation {})",
            ride_id, push.checkout_request_id
        );

        Ok(PaymentInitiatedResponse {
            ride_id: updated.id_hex(),
            payment_status: updated.payment_status,
            checkout_request_id: push.checkout_request_id,
            customer_message: push.customer_message,
        })
    }

    pub async fn query(&self, ride_id: &str, claims: &Claims) -> Result<PaymentStatusResponse> {
        let ride = self
            .rides
            .find(ride_id)
            .await?
            .ok_or(AppError::RideNotFound)?;

        let caller = claims.sub.as_str();
        if ride.passenger_id != caller && ride.driver_id.as_deref() != Some(caller) {
            return Err(AppError::Forbidden);
        }

        Ok(PaymentStatusResponse {
            ride_id: ride.id_hex(),
            payment_status: ride.payment_status,
            receipt: ride.mpesa_receipt,
        })
    }

    /// Reconcile one gateway callback. Delivery is at least once and may be
    /// reordered against a re-initiation, so settlement is a conditional
    /// update keyed by correlation token and guarded on `paid` being
    /// terminal. Nothing here propagates to the gateway; the HTTP handler
    /// acks unconditionally and redelivery heals internal failures.
    pub async fn handle_callback(&self, callback: &StkCallback) {
        let correlation_id = callback.checkout_request_id.as_str();

        if callback.result_code == 0 {
            let Some(receipt) = callback.receipt() else {
                warn!(
                    "Success callback {} carried no receipt; dropping",
                    correlation_id
                );
                return;
            };

            match self.rides.settle_success(correlation_id, &receipt).await {
                Ok(Some(ride)) => {
                    info!(
                        "Ride {} paid, receipt {}",
                        ride.id_hex(),
                        receipt
                    );
                    self.check_amount(&ride, callback);
                }
                Ok(None) => self.log_unmatched(correlation_id).await,
                Err(e) => error!(
                    "Failed to settle success callback {}: {}",
                    correlation_id, e
                ),
            }
        } else {
            match self.rides.settle_failure(correlation_id).await {
                Ok(Some(ride)) => info!(
                    "Ride {} payment failed: {} ({})",
                    ride.id_hex(),
                    callback.result_desc,
                    callback.result_code
                ),
                Ok(None) => self.log_unmatched(correlation_id).await,
                Err(e) => error!(
                    "Failed to settle failure callback {}: {}",
                    correlation_id, e
                ),
            }
        }
    }

    fn check_amount(&self, ride: &Ride, callback: &StkCallback) {
        if let Some(amount) = callback.amount() {
            if (amount - ride.fare).abs() > f64::EPSILON {
                warn!(
                    "Ride {} settled with amount {} but fare is {}",
                    ride.id_hex(),
                    amount,
                    ride.fare
                );
            }
        }
    }

    async fn log_unmatched(&self, correlation_id: &str) {
        match self.rides.find_by_correlation(correlation_id).await {
            Ok(Some(ride)) => info!(
                "Duplicate callback {} for settled ride {}; ignoring",
                correlation_id,
                ride.id_hex()
            ),
            Ok(None) => warn!("Callback {} matches no ride; discarding", correlation_id),
            Err(e) => error!("Lookup for callback {} failed: {}", correlation_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::ride::Ride;
    use crate::models::user::Role;
    use crate::services::mpesa_service::StkPushResponse;
    use crate::store::memory::MemoryRideStore;

    /// Scripted gateway: hands out sequential correlation tokens and counts
    /// calls; can be told to hang to exercise the timeout bound.
    struct FakeGateway {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeGateway {
        fn new() -> Self {
            FakeGateway {
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn hanging(delay: Duration) -> Self {
            FakeGateway {
                calls: AtomicUsize::new(0),
                delay: Some(delay),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn stk_push(
            &self,
            _phone: &str,
            _amount: f64,
            _account_reference: &str,
            _desc: &str,
        ) -> Result<StkPushResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(StkPushResponse {
                merchant_request_id: format!("MR-{}", n),
                checkout_request_id: format!("ws_CO_{}", n),
                response_code: "0".to_string(),
                response_description: "Success. Request accepted".to_string(),
                customer_message: "Enter your PIN".to_string(),
            })
        }
    }

    fn passenger() -> Claims {
        Claims {
            sub: "p1".to_string(),
            name: "p1".to_string(),
            phone: "0712345678".to_string(),
            role: Role::Passenger,
            exp: 2_000_000_000,
        }
    }

    fn success_callback(correlation_id: &str, receipt: &str, amount: f64) -> StkCallback {
        serde_json::from_value(serde_json::json!({
            "MerchantRequestID": "MR-x",
            "CheckoutRequestID": correlation_id,
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
            "CallbackMetadata": {
                "Item": [
                    { "Name": "Amount", "Value": amount },
                    { "Name": "MpesaReceiptNumber", "Value": receipt },
                    { "Name": "PhoneNumber", "Value": 254712345678u64 }
                ]
            }
        }))
        .unwrap()
    }

    fn failure_callback(correlation_id: &str, desc: &str) -> StkCallback {
        serde_json::from_value(serde_json::json!({
            "MerchantRequestID": "MR-x",
            "CheckoutRequestID": correlation_id,
            "ResultCode": 1032,
            "ResultDesc": desc,
        }))
        .unwrap()
    }

    async fn setup() -> (PaymentService, Arc<FakeGateway>, String) {
        let store = Arc::new(MemoryRideStore::new());
        let ride = store
            .insert(Ride::new("p1", "JKIA", "Westlands", 500.0))
            .await
            .unwrap();
        let gateway = Arc::new(FakeGateway::new());
        let service = PaymentService::new(store, gateway.clone());
        (service, gateway, ride.id_hex())
    }

    #[tokio::test]
    async fn initiate_then_success_callback_settles_once() {
        let (service, _, ride_id) = setup().await;

        let handle = service
            .initiate(&ride_id, &passenger(), "0712345678")
            .await
            .unwrap();
        assert_eq!(handle.payment_status, PaymentStatus::Pending);

        let callback = success_callback(&handle.checkout_request_id, "QAE123", 500.0);
        service.handle_callback(&callback).await;

        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Paid);
        assert_eq!(status.receipt.as_deref(), Some("QAE123"));

        // Duplicate delivery leaves the receipt alone.
        let duplicate = success_callback(&handle.checkout_request_id, "DIFFERENT", 500.0);
        service.handle_callback(&duplicate).await;
        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.receipt.as_deref(), Some("QAE123"));
    }

    #[tokio::test]
    async fn late_failure_never_downgrades_paid() {
        let (service, _, ride_id) = setup().await;
        let handle = service
            .initiate(&ride_id, &passenger(), "0712345678")
            .await
            .unwrap();

        service
            .handle_callback(&success_callback(&handle.checkout_request_id, "QAE123", 500.0))
            .await;
        service
            .handle_callback(&failure_callback(&handle.checkout_request_id, "Request cancelled"))
            .await;

        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Paid);
        assert_eq!(status.receipt.as_deref(), Some("QAE123"));
    }

    #[tokio::test]
    async fn reordered_success_still_wins_over_failure() {
        let (service, _, ride_id) = setup().await;
        let handle = service
            .initiate(&ride_id, &passenger(), "0712345678")
            .await
            .unwrap();

        // Failure delivered first, then the success for the same token.
        service
            .handle_callback(&failure_callback(&handle.checkout_request_id, "DS timeout"))
            .await;
        service
            .handle_callback(&success_callback(&handle.checkout_request_id, "QAE123", 500.0))
            .await;

        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Paid);
        assert_eq!(status.receipt.as_deref(), Some("QAE123"));
    }

    #[tokio::test]
    async fn failure_then_reinitiation_reaches_paid() {
        let (service, gateway, ride_id) = setup().await;

        let first = service
            .initiate(&ride_id, &passenger(), "0712345678")
            .await
            .unwrap();
        service
            .handle_callback(&failure_callback(&first.checkout_request_id, "insufficient funds"))
            .await;
        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Failed);

        let second = service
            .initiate(&ride_id, &passenger(), "0712345678")
            .await
            .unwrap();
        assert_ne!(second.checkout_request_id, first.checkout_request_id);
        assert_eq!(gateway.call_count(), 2);

        // A straggler for the dead token must not settle anything.
        service
            .handle_callback(&success_callback(&first.checkout_request_id, "STALE", 500.0))
            .await;
        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Pending);

        service
            .handle_callback(&success_callback(&second.checkout_request_id, "QAE456", 500.0))
            .await;
        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Paid);
        assert_eq!(status.receipt.as_deref(), Some("QAE456"));
    }

    #[tokio::test]
    async fn already_paid_rejects_without_gateway_call() {
        let (service, gateway, ride_id) = setup().await;
        let handle = service
            .initiate(&ride_id, &passenger(), "0712345678")
            .await
            .unwrap();
        service
            .handle_callback(&success_callback(&handle.checkout_request_id, "QAE123", 500.0))
            .await;
        assert_eq!(gateway.call_count(), 1);

        let result = service.initiate(&ride_id, &passenger(), "0712345678").await;
        assert!(matches!(result, Err(AppError::AlreadyPaid)));
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn initiation_is_passenger_only() {
        let (service, _, ride_id) = setup().await;
        let driver = Claims {
            sub: "d1".to_string(),
            name: "d1".to_string(),
            phone: "0700000000".to_string(),
            role: Role::Driver,
            exp: 2_000_000_000,
        };
        let result = service.initiate(&ride_id, &driver, "0700000000").await;
        assert!(matches!(result, Err(AppError::Forbidden)));
    }

    #[tokio::test]
    async fn gateway_timeout_leaves_status_unchanged() {
        let store = Arc::new(MemoryRideStore::new());
        let ride = store
            .insert(Ride::new("p1", "JKIA", "Westlands", 500.0))
            .await
            .unwrap();
        let gateway = Arc::new(FakeGateway::hanging(Duration::from_secs(5)));
        let service = PaymentService::new(store.clone(), gateway)
            .with_timeout(Duration::from_millis(20));

        let result = service
            .initiate(&ride.id_hex(), &passenger(), "0712345678")
            .await;
        assert!(matches!(result, Err(AppError::GatewayTimeout)));

        let current = store.find(&ride.id_hex()).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Unpaid);
        assert!(current.payment_correlation_id.is_none());
    }

    #[tokio::test]
    async fn unmatched_callback_is_discarded() {
        let (service, _, ride_id) = setup().await;
        service
            .handle_callback(&success_callback("ws_CO_unknown", "QAE999", 500.0))
            .await;
        let status = service.query(&ride_id, &passenger()).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Unpaid);
        assert!(status.receipt.is_none());
    }
}
