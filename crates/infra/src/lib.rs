//! # War Room Infrastructure
//!
//! I/O side of the War Room Graph gateway.
//!
//! This crate contains:
//! - The resilient [`GraphClient`] (rate limiting, circuit breaking,
//!   pagination, batch requests)
//! - OAuth token management and background refresh
//! - The HTTP transport
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Wire types and errors live in `warroom-domain`
//! - Resilience primitives live in `warroom-common`
//! - Contains all "impure" code (network, environment, files)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod config;
pub mod graph;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use auth::{AuthorizationRequest, TokenManager, TokenRefresher, TokenStore};
pub use graph::{GraphApi, GraphClient, GraphClientBuilder, HealthStatus};
pub use http::{HttpClient, HttpClientBuilder};
pub use observability::{init_tracing, try_init_tracing, LogFormat};
