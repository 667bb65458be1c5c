use std::sync::Arc;

use mongodb::Database;

use crate::services::payment_service::PaymentService;
use crate::services::ride_service::RideService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub rides: Arc<RideService>,
    /// Absent when the M-Pesa credentials are not configured; payment routes
    /// answer 503 in that case.
    pub payments: Option<Arc<PaymentService>>,
}

impl AppState {
    pub fn new(db: Database, rides: Arc<RideService>) -> Self {
        AppState {
            db,
            rides,
            payments: None,
        }
    }

    pub fn with_payments(mut self, payments: Arc<PaymentService>) -> Self {
        self.payments = Some(payments);
        self
    }
}
