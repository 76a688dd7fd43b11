mod app_core;
mod browser;
mod callback_server;
mod config;
mod credential_store;
mod error;
mod lyrics_fetcher;
mod spotify_client;
mod state;

use app_core::App;
use config::AppConfig;
use error::LyricsError;

#[tokio::main]
async fn main() -> Result<(), LyricsError> {
    // stdout carries the lyrics, logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = AppConfig::load()?;
    log::debug!("Credential path: {:?}", config.token_path);

    App::new(config)?.run().await
}
