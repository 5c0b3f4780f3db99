pub mod auth;
pub mod order_status;
pub mod orders;
