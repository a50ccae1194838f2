//! OAuth session management
//!
//! [`TokenManager`] talks to the provider's token endpoints and caches the
//! resulting tokens per session in a [`TokenStore`]. [`TokenRefresher`] keeps
//! a session's token fresh in the background.

pub mod refresh;
pub mod state;
pub mod token_manager;
pub mod token_store;

pub use refresh::TokenRefresher;
pub use state::{generate_state, verify_state};
pub use token_manager::{AuthorizationRequest, TokenManager};
pub use token_store::TokenStore;
