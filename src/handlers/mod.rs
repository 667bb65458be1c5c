pub mod payment_handlers;
pub mod ride_handlers;
