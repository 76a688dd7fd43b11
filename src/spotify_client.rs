use std::sync::Arc;

use async_trait::async_trait;
use rspotify::{
    model::{AdditionalType, CurrentlyPlayingContext, PlayableItem},
    prelude::{BaseClient, OAuthClient},
    scopes, AuthCodeSpotify, Config, Credentials, OAuth,
};

use crate::callback_server::CodeExchanger;
use crate::config::AppConfig;
use crate::credential_store::Credential;
use crate::error::{LyricsError, Result};

/// What the user's active device is playing
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: String,
    /// Primary artist; the show name for podcast episodes
    pub artist: String,
    pub is_playing: bool,
}

impl NowPlaying {
    pub fn from_context(context: CurrentlyPlayingContext) -> Option<Self> {
        let (track, artist) = match context.item? {
            PlayableItem::Track(track) => {
                let artist = track
                    .artists
                    .into_iter()
                    .next()
                    .map(|a| a.name)
                    .unwrap_or_default();
                (track.name, artist)
            }
            PlayableItem::Episode(episode) => (episode.name, episode.show.name),
        };

        Some(Self {
            track,
            artist,
            is_playing: context.is_playing,
        })
    }
}

/// Spotify Web API client for authorization and playback state
#[derive(Clone)]
pub struct SpotifyClient {
    client: Arc<AuthCodeSpotify>,
}

impl SpotifyClient {
    /// Create a new SpotifyClient from the application configuration
    ///
    /// rspotify's own token cache stays off; the credential store owns persistence.
    pub fn new(config: &AppConfig) -> Self {
        let creds = Credentials::new(&config.spotify_client_id, &config.spotify_client_secret);

        let oauth = OAuth {
            redirect_uri: config.redirect_uri(),
            scopes: scopes!("user-read-currently-playing"),
            ..Default::default()
        };

        let config = Config {
            token_cached: false,
            token_refreshing: true,
            ..Default::default()
        };

        Self {
            client: Arc::new(AuthCodeSpotify::with_config(creds, oauth, config)),
        }
    }

    /// Consent page URL carrying `state` for the callback to echo back
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let mut client = (*self.client).clone();
        client.oauth.state = state.to_string();

        client.get_authorize_url(false).map_err(|e| {
            LyricsError::AuthenticationFailed(format!("Failed to generate auth URL: {}", e))
        })
    }

    /// Install a stored credential as the client's token
    pub async fn set_credential(&self, credential: Credential) -> Result<()> {
        let mut token = self.client.token.lock().await.map_err(|_| {
            LyricsError::SpotifyApiError("token lock is unavailable".to_string())
        })?;
        *token = Some(credential.into());
        Ok(())
    }

    /// The client's current token, if any
    pub async fn credential(&self) -> Result<Option<Credential>> {
        let token = self.client.token.lock().await.map_err(|_| {
            LyricsError::SpotifyApiError("token lock is unavailable".to_string())
        })?;
        Ok(token.clone().map(Credential::from))
    }

    /// Refresh the installed credential when it has expired and can be refreshed
    pub async fn refresh_if_expired(&self) -> Result<()> {
        let Some(credential) = self.credential().await? else {
            return Ok(());
        };

        if !credential.is_expired() || credential.refresh_token.is_none() {
            return Ok(());
        }

        log::info!("Stored token is expired, refreshing");
        self.client.refresh_token().await.map_err(|e| {
            LyricsError::AuthenticationFailed(format!(
                "Token refresh failed, re-authentication required: {}",
                e
            ))
        })?;

        Ok(())
    }

    /// Get what is playing right now, or `None` if Spotify reports nothing at all
    pub async fn currently_playing(&self) -> Result<Option<NowPlaying>> {
        let context = self
            .client
            .current_playing(None, None::<Option<&AdditionalType>>)
            .await
            .map_err(|e| {
                LyricsError::SpotifyApiError(format!(
                    "Failed to get currently playing track: {}",
                    e
                ))
            })?;

        Ok(context.and_then(NowPlaying::from_context))
    }
}

#[async_trait]
impl CodeExchanger for SpotifyClient {
    async fn exchange(&self, code: &str) -> Result<Credential> {
        self.client.request_token(code).await.map_err(|e| {
            LyricsError::AuthenticationFailed(format!("Failed to exchange code for token: {}", e))
        })?;

        self.credential().await?.ok_or_else(|| {
            LyricsError::AuthenticationFailed("token endpoint returned no token".to_string())
        })
    }
}
