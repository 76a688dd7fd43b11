use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LyricsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No stored credential at {}", .0.display())]
    CredentialNotFound(PathBuf),

    #[error("Stored credential at {} is malformed: {source}", .path.display())]
    CredentialParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Secure random source unavailable: {0}")]
    RandomUnavailable(String),

    #[error("Authorization state mismatch: {actual:?} != {expected}")]
    StateMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("Spotify authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization timed out after {}s", .0.as_secs())]
    AuthorizationTimedOut(Duration),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(#[source] std::io::Error),

    #[error("Spotify API error: {0}")]
    SpotifyApiError(String),

    #[error("Lyrics fetch failed: {0}")]
    LyricsFetchError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LyricsError>;
