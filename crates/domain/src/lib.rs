//! # War Room Domain
//!
//! Provider-facing types for the War Room Graph gateway.
//!
//! This crate contains:
//! - Graph wire types (response envelope, paging, tokens, batch)
//! - The [`GraphError`] taxonomy and `Result` alias
//! - Configuration structures
//! - Provider constants and protocol limits
//!
//! ## Architecture
//! - No dependencies on other War Room crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use constants::*;
pub use errors::*;
pub use types::*;
