pub mod memory;
pub mod mongo;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::ride::Ride;

/// Persistence seam for the ride record. Every state transition is a single
/// conditional update: the store checks the expected current state and writes
/// the new one in one operation, so concurrent callers can never both win.
/// `Ok(None)` from a `try_*`/`settle_*` method means the condition did not
/// hold (lost race, wrong state, or unknown key) — never a storage failure.
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn insert(&self, ride: Ride) -> Result<Ride>;

    async fn find(&self, ride_id: &str) -> Result<Option<Ride>>;

    /// Secondary lookup keyed by the gateway correlation token. Callbacks
    /// arrive keyed by it, never by ride id.
    async fn find_by_correlation(&self, correlation_id: &str) -> Result<Option<Ride>>;

    async fn list_for_passenger(&self, passenger_id: &str) -> Result<Vec<Ride>>;

    /// Rides still open for a driver to claim (`status = requested`).
    async fn list_open(&self) -> Result<Vec<Ride>>;

    /// requested -> accepted, binding the driver. Exactly one concurrent
    /// caller gets `Some`.
    async fn try_accept(&self, ride_id: &str, driver_id: &str) -> Result<Option<Ride>>;

    async fn set_arrived(&self, ride_id: &str) -> Result<Option<Ride>>;

    /// accepted -> completed.
    async fn try_complete(&self, ride_id: &str) -> Result<Option<Ride>>;

    async fn set_rating(
        &self,
        ride_id: &str,
        rating: i32,
        review: Option<&str>,
    ) -> Result<Option<Ride>>;

    /// Bind a fresh correlation token and move to `pending`, guarded on the
    /// ride not being `paid` already.
    async fn begin_payment(&self, ride_id: &str, correlation_id: &str) -> Result<Option<Ride>>;

    /// Correlation match and not yet `paid` -> `paid` with the receipt. The
    /// only path that ever writes `paid`.
    async fn settle_success(&self, correlation_id: &str, receipt: &str) -> Result<Option<Ride>>;

    /// Correlation match and not yet `paid` -> `failed`.
    async fn settle_failure(&self, correlation_id: &str) -> Result<Option<Ride>>;
}

/// The driver profile document belongs to the identity/profile service; the
/// core owns exactly one effect on it.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    async fn set_available(&self, driver_id: &str, available: bool) -> Result<()>;
}
