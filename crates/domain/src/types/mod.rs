//! Graph API wire types

pub mod batch;
pub mod envelope;
pub mod request;
pub mod token;

pub use batch::{BatchHeader, BatchRequest, BatchResponse};
pub use envelope::{Cursors, ErrorData, ErrorEnvelope, GraphResponse, Page, Paging, ProviderError};
pub use request::{param_to_query_value, HttpMethod, RequestOptions};
pub use token::{AccessToken, DebugTokenData, PermissionGrant, TokenResponse};
