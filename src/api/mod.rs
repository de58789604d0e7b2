//! HTTP API: webhook receiver, manual triggers, mapping administration

pub mod handlers;
pub mod routes;
pub mod signature;

pub use routes::create_router;
