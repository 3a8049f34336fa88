//! HTTP route handlers.

pub mod health;
pub mod lifecycles;
pub mod metrics;
pub mod orders;
pub mod stats;
