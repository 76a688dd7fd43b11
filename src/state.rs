//! CSRF state for the OAuth authorization-code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::{LyricsError, Result};

/// Number of random bytes behind each state value
pub const STATE_BYTES: usize = 32;

/// Generate a URL-safe random string from `byte_len` bytes of OS randomness.
///
/// Failure of the secure random source is returned as
/// [`LyricsError::RandomUnavailable`]; there is no weaker fallback.
pub fn generate_state(byte_len: usize) -> Result<String> {
    let mut bytes = vec![0u8; byte_len];
    getrandom::getrandom(&mut bytes).map_err(|e| LyricsError::RandomUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
