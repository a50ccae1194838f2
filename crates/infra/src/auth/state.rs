//! OAuth `state` parameter for CSRF protection
//!
//! The state is sent with the authorization dialog and must come back
//! unchanged on the redirect. Callers persist it between the two legs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

/// Generate a random state token
///
/// Returns a URL-safe base64-encoded random string of 32 bytes (43 characters).
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Validate that the state token matches
///
/// Runs in time independent of where the inputs first differ. An empty
/// expected state never matches.
pub fn verify_state(expected: &str, received: &str) -> bool {
    if expected.is_empty() || expected.len() != received.len() {
        return false;
    }

    expected.bytes().zip(received.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
