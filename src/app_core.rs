use std::io::{self, Write};
use std::sync::Arc;

use crate::browser;
use crate::callback_server::{self, CallbackServer};
use crate::config::AppConfig;
use crate::credential_store::{self, Credential};
use crate::error::{LyricsError, Result};
use crate::lyrics_fetcher::{self, LyricsFetcher};
use crate::spotify_client::{NowPlaying, SpotifyClient};
use crate::state::{self, STATE_BYTES};

/// Main application structure coordinating all components
pub struct App {
    config: AppConfig,
    spotify_client: SpotifyClient,
    lyrics_fetcher: LyricsFetcher,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let spotify_client = SpotifyClient::new(&config);
        let lyrics_fetcher = LyricsFetcher::new(&config.lyrics_endpoint, &config.lyrics_api_key)?;

        Ok(Self {
            config,
            spotify_client,
            lyrics_fetcher,
        })
    }

    /// Print the lyrics of whatever is playing right now
    pub async fn run(&self) -> Result<()> {
        let stored = self.load_or_authorize().await?;
        self.spotify_client.set_credential(stored.clone()).await?;
        self.spotify_client.refresh_if_expired().await?;

        let now_playing = self.spotify_client.currently_playing().await?;

        // rspotify may also have refreshed the token during the request
        self.persist_if_changed(&stored).await?;

        report(&self.lyrics_fetcher, now_playing.as_ref(), &mut io::stdout()).await
    }

    /// Load the stored credential, running the authorization flow if there is none
    async fn load_or_authorize(&self) -> Result<Credential> {
        let path = &self.config.token_path;

        match credential_store::load(path) {
            Err(LyricsError::CredentialNotFound(_)) => {
                log::info!("No stored credential at {:?}, authorizing with Spotify", path);
                let credential = self.authorize().await?;
                credential_store::save(path, &credential)?;
                credential_store::load(path)
            }
            result => result,
        }
    }

    /// Run the authorization-code flow through the browser and the callback server
    async fn authorize(&self) -> Result<Credential> {
        let state = state::generate_state(STATE_BYTES)?;

        let server = CallbackServer::bind(self.config.callback_port).await?;
        log::debug!("Waiting for Spotify callback on {}", server.local_addr()?);
        let outcome = server.spawn(state.clone(), Arc::new(self.spotify_client.clone()));

        let url = self.spotify_client.authorize_url(&state)?;
        browser::open(&url)?;

        callback_server::wait_for_outcome(outcome, self.config.auth_timeout()).await
    }

    async fn persist_if_changed(&self, stored: &Credential) -> Result<()> {
        match self.spotify_client.credential().await? {
            Some(current) if &current != stored => {
                log::info!("Credential was refreshed, saving it");
                credential_store::save(&self.config.token_path, &current)
            }
            _ => Ok(()),
        }
    }
}

/// Write the lyrics block for the current track, or `No track playing`.
///
/// Nothing is written when the lyrics API has no lyrics for the track.
pub async fn report<W: Write>(
    lyrics_fetcher: &LyricsFetcher,
    now_playing: Option<&NowPlaying>,
    out: &mut W,
) -> Result<()> {
    match now_playing {
        Some(track) if track.is_playing => {
            if let Some(lyrics) = lyrics_fetcher
                .fetch_lyrics(&track.track, &track.artist)
                .await?
            {
                lyrics_fetcher::write_lyrics(out, &track.track, &track.artist, &lyrics)?;
            }
        }
        _ => writeln!(out, "No track playing")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn now_playing(is_playing: bool) -> NowPlaying {
        NowPlaying {
            track: "Shape of You".to_string(),
            artist: "Ed Sheeran".to_string(),
            is_playing,
        }
    }

    async fn lyrics_api(status: u16, expected_calls: u64) -> (MockServer, LyricsFetcher) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(serde_json::json!({ "lyrics": "line1\nline2" })),
            )
            .expect(expected_calls)
            .mount(&server)
            .await;

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let fetcher = LyricsFetcher::with_client(client, format!("{}/", server.uri()), "key");
        (server, fetcher)
    }

    fn test_config(token_path: std::path::PathBuf) -> AppConfig {
        AppConfig {
            spotify_client_id: "id".to_string(),
            spotify_client_secret: "secret".to_string(),
            lyrics_api_key: "key".to_string(),
            token_path,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_report_prints_lyrics() {
        let (server, fetcher) = lyrics_api(200, 1).await;

        let mut out = Vec::new();
        report(&fetcher, Some(&now_playing(true)), &mut out)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "######################\nShape of You - Ed Sheeran\n######################\n\nline1\nline2\n"
        );
        server.verify().await;
    }

    #[tokio::test]
    async fn test_paused_track_skips_lyrics() {
        let (server, fetcher) = lyrics_api(200, 0).await;

        let mut out = Vec::new();
        report(&fetcher, Some(&now_playing(false)), &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "No track playing\n");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_nothing_reported_by_spotify() {
        let (server, fetcher) = lyrics_api(200, 0).await;

        let mut out = Vec::new();
        report(&fetcher, None, &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "No track playing\n");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_missing_lyrics_print_nothing() {
        let (server, fetcher) = lyrics_api(404, 1).await;

        let mut out = Vec::new();
        report(&fetcher, Some(&now_playing(true)), &mut out)
            .await
            .unwrap();

        assert!(out.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_stored_credential_skips_authorization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lyrics");
        let credential = Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: None,
            scopes: vec!["user-read-currently-playing".to_string()],
        };
        credential_store::save(&path, &credential).unwrap();

        let app = App::new(test_config(path)).unwrap();
        assert_eq!(app.load_or_authorize().await.unwrap(), credential);
    }

    #[tokio::test]
    async fn test_malformed_credential_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lyrics");
        std::fs::write(&path, "not json").unwrap();

        let app = App::new(test_config(path)).unwrap();
        assert!(matches!(
            app.load_or_authorize().await,
            Err(LyricsError::CredentialParse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unchanged_credential_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lyrics");
        let credential = Credential {
            access_token: "access".to_string(),
            refresh_token: None,
            expires_at: None,
            scopes: Vec::new(),
        };

        let app = App::new(test_config(path.clone())).unwrap();
        app.spotify_client
            .set_credential(credential.clone())
            .await
            .unwrap();
        app.persist_if_changed(&credential).await.unwrap();
        assert!(!path.exists());

        let mut refreshed = credential.clone();
        refreshed.access_token = "new-access".to_string();
        app.spotify_client
            .set_credential(refreshed.clone())
            .await
            .unwrap();
        app.persist_if_changed(&credential).await.unwrap();
        assert_eq!(credential_store::load(&path).unwrap(), refreshed);
    }
}
