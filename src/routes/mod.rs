pub mod payments;
pub mod rides;
