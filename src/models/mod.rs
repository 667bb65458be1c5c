pub mod ride;
pub mod user;
