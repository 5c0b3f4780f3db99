//! Orderdesk
//!
//! Client-side order lifecycle and refund workflow for a storefront and
//! back-office e-commerce API: the status state machine, role-gated actions,
//! the order detail controller with its refund dialogs, and an in-memory
//! reference backend that speaks the same wire format.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod client;
pub mod config;
pub mod errors;
pub mod mock_backend;
pub mod models;
pub mod order_detail;
pub mod services;
pub mod session;
pub mod tracing;

pub use client::ApiClient;
pub use config::AppConfig;
pub use errors::ServiceError;
pub use order_detail::OrderDetailController;
pub use session::Session;
