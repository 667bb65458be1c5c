pub mod mpesa_service;
pub mod payment_service;
pub mod ride_service;
