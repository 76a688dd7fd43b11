use std::io::{self, Write};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{LyricsError, Result};

const SEPARATOR: &str = "######################";

/// Response body of the lyrics lookup API
#[derive(Debug, Deserialize)]
struct LyricsResponse {
    lyrics: String,
}

/// HTTP client for the lyrics lookup API
pub struct LyricsFetcher {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl LyricsFetcher {
    /// Create a new LyricsFetcher with configured HTTP client
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self::with_client(http_client, endpoint, api_key))
    }

    pub fn with_client(
        http_client: Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn lookup_url(&self, title: &str, artist: &str) -> String {
        format!(
            "{}?api_key={}&title={}&artist={}",
            self.endpoint,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(title),
            urlencoding::encode(artist)
        )
    }

    /// Fetch lyrics for a track.
    ///
    /// Only HTTP 200 is read. Any other status gives `Ok(None)` and is only
    /// logged; connection failures and unreadable 200 bodies are errors.
    pub async fn fetch_lyrics(&self, title: &str, artist: &str) -> Result<Option<String>> {
        log::info!("Fetching lyrics for: {} - {}", artist, title);

        let response = self
            .http_client
            .get(self.lookup_url(title, artist))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: LyricsResponse = response.json().await.map_err(|e| {
                    LyricsError::LyricsFetchError(format!("Unreadable lyrics response: {}", e))
                })?;
                Ok(Some(body.lyrics))
            }
            StatusCode::NOT_FOUND => {
                log::info!("Lyrics not found for: {} - {}", artist, title);
                Ok(None)
            }
            status => {
                log::warn!("Lyrics API returned status: {}", status);
                Ok(None)
            }
        }
    }
}

/// Write the lyrics block: a framed `<title> - <artist>` header, a blank line,
/// then the lyrics exactly as received.
pub fn write_lyrics<W: Write>(out: &mut W, title: &str, artist: &str, lyrics: &str) -> io::Result<()> {
    writeln!(out, "{}", SEPARATOR)?;
    writeln!(out, "{} - {}", title, artist)?;
    writeln!(out, "{}", SEPARATOR)?;
    writeln!(out)?;
    writeln!(out, "{}", lyrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn direct_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    fn fetcher(server: &MockServer) -> LyricsFetcher {
        LyricsFetcher::with_client(direct_client(), format!("{}/", server.uri()), "secret key")
    }

    #[test]
    fn test_lyrics_block_format() {
        let mut out = Vec::new();
        write_lyrics(&mut out, "Shape of You", "Ed Sheeran", "line1\nline2").unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "######################\n\
             Shape of You - Ed Sheeran\n\
             ######################\n\
             \n\
             line1\n\
             line2\n"
        );
    }

    #[test]
    fn test_lookup_url_escapes_query() {
        let fetcher = LyricsFetcher::new("https://lyrics.example/", "k&y").unwrap();
        assert_eq!(
            fetcher.lookup_url("Rock & Roll", "AC/DC"),
            "https://lyrics.example/?api_key=k%26y&title=Rock%20%26%20Roll&artist=AC%2FDC"
        );
    }

    #[tokio::test]
    async fn test_fetch_lyrics_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("api_key", "secret key"))
            .and(query_param("title", "Shape of You"))
            .and(query_param("artist", "Ed Sheeran"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "lyrics": "line1\nline2"
                })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let lyrics = fetcher(&server)
            .fetch_lyrics("Shape of You", "Ed Sheeran")
            .await
            .unwrap();
        assert_eq!(lyrics.as_deref(), Some("line1\nline2"));
    }

    #[tokio::test]
    async fn test_not_found_is_silent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let lyrics = fetcher(&server).fetch_lyrics("Unknown", "Nobody").await.unwrap();
        assert_eq!(lyrics, None);
    }

    #[tokio::test]
    async fn test_server_error_is_silent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let lyrics = fetcher(&server).fetch_lyrics("a", "b").await.unwrap();
        assert_eq!(lyrics, None);
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = fetcher(&server).fetch_lyrics("a", "b").await.unwrap_err();
        assert!(matches!(err, LyricsError::LyricsFetchError(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_error() {
        // bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let fetcher =
            LyricsFetcher::with_client(direct_client(), format!("http://127.0.0.1:{}/", port), "key");

        let err = fetcher.fetch_lyrics("a", "b").await.unwrap_err();
        assert!(matches!(err, LyricsError::NetworkError(_)));
    }
}
