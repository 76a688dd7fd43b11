//! Local HTTP listener that completes the OAuth authorization-code flow.
//!
//! The listener accepts connections until one request to `/callback` has been
//! handled, reports the outcome over a oneshot channel and then stops. Unrelated
//! paths (browsers ask for `/favicon.ico`) get a 404 and do not end the flow.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

use crate::credential_store::Credential;
use crate::error::{LyricsError, Result};

const CALLBACK_PATH: &str = "/callback";
const SUCCESS_MESSAGE: &str = "Login successfully. Please return to your terminal.";
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Exchanges an authorization code for a credential at the provider's token endpoint
#[async_trait]
pub trait CodeExchanger: Send + Sync + 'static {
    async fn exchange(&self, code: &str) -> Result<Credential>;
}

/// What a single request to the listener amounts to
enum Handled {
    /// Not a `GET /callback`; keep listening
    Ignored,
    /// The callback was handled, successfully or not
    Finished(Result<Credential>),
}

/// Query parameters Spotify appends to the redirect URI
#[derive(Debug, Default, PartialEq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub struct CallbackServer {
    listener: TcpListener,
}

impl CallbackServer {
    /// Bind the listener on the loopback interface
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        log::debug!("Callback server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve callbacks on a background task.
    ///
    /// The returned receiver yields exactly one outcome: the credential, or the
    /// reason the authorization failed.
    pub fn spawn<E: CodeExchanger>(
        self,
        expected_state: String,
        exchanger: Arc<E>,
    ) -> oneshot::Receiver<Result<Credential>> {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = self.serve(Arc::from(expected_state), exchanger).await;
            if tx.send(outcome).is_err() {
                log::debug!("Authorization outcome dropped, nobody is waiting");
            }
        });

        rx
    }

    /// Accept connections until the first `/callback` request finishes.
    ///
    /// Every connection runs on its own task, so an idle socket (a browser
    /// preconnect) never holds up the real redirect.
    async fn serve<E: CodeExchanger>(
        self,
        expected_state: Arc<str>,
        exchanger: Arc<E>,
    ) -> Result<Credential> {
        let (finished_tx, mut finished_rx) = mpsc::channel(1);

        loop {
            tokio::select! {
                Some(outcome) = finished_rx.recv() => return outcome,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            log::warn!("Failed to accept callback connection: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    log::debug!("Callback connection from {}", peer);

                    let expected_state = Arc::clone(&expected_state);
                    let exchanger = Arc::clone(&exchanger);
                    let finished_tx = finished_tx.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, &expected_state, exchanger.as_ref()).await {
                            Ok(Handled::Ignored) => {}
                            Ok(Handled::Finished(outcome)) => {
                                // only the first finished callback is read
                                let _ = finished_tx.try_send(outcome);
                            }
                            Err(e) => log::warn!("Failed to handle callback connection: {}", e),
                        }
                    });
                }
            }
        }
    }
}

/// Wait for the callback outcome, giving up after `timeout`
pub async fn wait_for_outcome(
    outcome: oneshot::Receiver<Result<Credential>>,
    timeout: Duration,
) -> Result<Credential> {
    match tokio::time::timeout(timeout, outcome).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(LyricsError::AuthenticationFailed(
            "callback server stopped without a result".to_string(),
        )),
        Err(_) => Err(LyricsError::AuthorizationTimedOut(timeout)),
    }
}

async fn handle_connection<E: CodeExchanger>(
    mut stream: TcpStream,
    expected_state: &str,
    exchanger: &E,
) -> Result<Handled> {
    let mut buffer = [0u8; 4096];
    let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buffer))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no request received"))??;
    let request = String::from_utf8_lossy(&buffer[..n]);

    // GET /callback?code=xxx&state=yyy HTTP/1.1
    let mut request_line = request.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("");
    let target = request_line.next().unwrap_or("");
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    if path != CALLBACK_PATH {
        write_response(&mut stream, 404, "Not Found", "Not Found").await?;
        return Ok(Handled::Ignored);
    }

    if method != "GET" {
        write_response(&mut stream, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(Handled::Ignored);
    }

    let params = parse_query(query);
    let (status, reason, body, outcome) = authorize(params, expected_state, exchanger).await;
    write_response(&mut stream, status, reason, body).await?;

    Ok(Handled::Finished(outcome))
}

async fn authorize<E: CodeExchanger>(
    params: CallbackParams,
    expected_state: &str,
    exchanger: &E,
) -> (u16, &'static str, &'static str, Result<Credential>) {
    if params.state.as_deref() != Some(expected_state) {
        log::error!("Callback state does not match the authorization request");
        let err = LyricsError::StateMismatch {
            expected: expected_state.to_string(),
            actual: params.state,
        };
        return (404, "Not Found", "Not Found", Err(err));
    }

    if let Some(error) = params.error {
        log::error!("Authorization was denied: {}", error);
        let err = LyricsError::AuthenticationFailed(format!("authorization denied: {}", error));
        return (403, "Forbidden", "Couldn't get token", Err(err));
    }

    let Some(code) = params.code else {
        let err = LyricsError::AuthenticationFailed("callback carried no code".to_string());
        return (403, "Forbidden", "Couldn't get token", Err(err));
    };

    match exchanger.exchange(&code).await {
        Ok(credential) => {
            log::info!("Authorization code exchanged for a credential");
            (200, "OK", SUCCESS_MESSAGE, Ok(credential))
        }
        Err(e) => {
            log::error!("Token exchange failed: {}", e);
            (403, "Forbidden", "Couldn't get token", Err(e))
        }
    }
}

fn parse_query(query: &str) -> CallbackParams {
    let mut params = CallbackParams::default();

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = match urlencoding::decode(value) {
            Ok(value) => value.into_owned(),
            Err(_) => continue,
        };
        match key {
            "code" => params.code = Some(value),
            "state" => params.state = Some(value),
            "error" => params.error = Some(value),
            _ => {}
        }
    }

    params
}

async fn write_response(stream: &mut TcpStream, status: u16, reason: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
