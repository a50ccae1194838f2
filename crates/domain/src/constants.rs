//! Provider constants
//!
//! Centralized location for defaults and protocol limits used across the
//! gateway crates.

// Provider endpoints
pub const DEFAULT_API_VERSION: &str = "21.0";
pub const DEFAULT_GRAPH_HOST: &str = "https://graph.facebook.com";
pub const DEFAULT_DIALOG_HOST: &str = "https://www.facebook.com";

// OAuth
pub const DEFAULT_SESSION: &str = "default";
pub const DEFAULT_SCOPES: [&str; 2] = ["ads_read", "ads_management"];
pub const GRANT_TYPE_EXCHANGE: &str = "fb_exchange_token";

// Request limits
pub const MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

// Quota defaults (200 calls per rolling hour)
pub const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 200;
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 3_600_000;

// Provider error codes
pub const RATE_LIMIT_CODES: [i64; 3] = [4, 17, 32];
pub const AUTHENTICATION_CODES: [i64; 2] = [190, 102];
pub const PERMISSION_CODES: [i64; 2] = [200, 10];
pub const VALIDATION_CODE: i64 = 100;
