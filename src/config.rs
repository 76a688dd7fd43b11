use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LyricsError, Result};

const DEFAULT_LYRICS_ENDPOINT: &str = "https://songlyricsfree.herokuapp.com/";
const DEFAULT_CALLBACK_PORT: u16 = 8080;
const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 300;
const TOKEN_FILE_NAME: &str = ".lyrics";

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Spotify application client id
    pub spotify_client_id: String,

    /// Spotify application client secret
    pub spotify_client_secret: String,

    /// Key sent to the lyrics lookup API
    pub lyrics_api_key: String,

    /// Base URL of the lyrics lookup API
    pub lyrics_endpoint: String,

    /// Local port the OAuth callback listener binds to
    pub callback_port: u16,

    /// Where the OAuth credential is persisted
    pub token_path: PathBuf,

    /// How long to wait for the user to finish the browser login
    pub auth_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            lyrics_api_key: String::new(),
            lyrics_endpoint: DEFAULT_LYRICS_ENDPOINT.to_string(),
            callback_port: DEFAULT_CALLBACK_PORT,
            token_path: default_token_path(),
            auth_timeout_secs: DEFAULT_AUTH_TIMEOUT_SECS,
        }
    }
}

/// `<home>/.lyrics`, or `./.lyrics` when no home directory is known
fn default_token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(TOKEN_FILE_NAME)
}

impl AppConfig {
    /// Get the path to the config file
    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("LYRICS_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("lyrics").join("config.json"))
    }

    /// Load configuration from the config file and the process environment.
    ///
    /// Values from the environment win over the file. The result is validated,
    /// so a missing secret is reported here rather than at first use.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_file_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file, or return defaults if it doesn't exist
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            LyricsError::ConfigError(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = serde_json::from_str(&contents).map_err(|e| {
            LyricsError::ConfigError(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Override fields from environment variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SPOTIFY_CLIENT_ID") {
            self.spotify_client_id = value;
        }
        if let Some(value) = lookup("SPOTIFY_CLIENT_SECRET") {
            self.spotify_client_secret = value;
        }
        if let Some(value) = lookup("LYRICS_API_KEY") {
            self.lyrics_api_key = value;
        }
        if let Some(value) = lookup("LYRICS_ENDPOINT") {
            self.lyrics_endpoint = value;
        }
        if let Some(value) = lookup("LYRICS_TOKEN_PATH") {
            self.token_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("LYRICS_CALLBACK_PORT") {
            self.callback_port = parse_env("LYRICS_CALLBACK_PORT", &value)?;
        }
        if let Some(value) = lookup("LYRICS_AUTH_TIMEOUT_SECS") {
            self.auth_timeout_secs = parse_env("LYRICS_AUTH_TIMEOUT_SECS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("spotify_client_id", &self.spotify_client_id, "SPOTIFY_CLIENT_ID"),
            (
                "spotify_client_secret",
                &self.spotify_client_secret,
                "SPOTIFY_CLIENT_SECRET",
            ),
            ("lyrics_api_key", &self.lyrics_api_key, "LYRICS_API_KEY"),
        ];

        for (field, value, env) in required {
            if value.trim().is_empty() {
                return Err(LyricsError::ConfigError(format!(
                    "{} is not set (set {} or add it to the config file)",
                    field, env
                )));
            }
        }

        if self.auth_timeout_secs == 0 {
            return Err(LyricsError::ConfigError(
                "auth_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// The redirect URI registered with Spotify; must match the callback listener
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.callback_port)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        LyricsError::ConfigError(format!("{} has an invalid value: {:?}", key, value))
    })
}
