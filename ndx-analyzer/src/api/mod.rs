//! HTTP API handlers for ndx-analyzer

pub mod analyze;
pub mod client;
pub mod health;
pub mod runs;

pub use analyze::analyze_routes;
pub use health::health_routes;
pub use runs::run_routes;
