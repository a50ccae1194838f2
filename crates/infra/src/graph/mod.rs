//! Graph API access: the resilient client, error mapping and wiring

pub mod client;
pub mod errors;
pub mod factory;

pub use client::{limiter_key, GraphClient, GraphClientBuilder, HealthStatus};
pub use errors::{map_error_response, map_provider_error};
pub use factory::{GraphApi, LoggingObserver};
