use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use rspotify::Token;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{LyricsError, Result};

/// Seconds before the recorded expiry at which a credential counts as expired
const EXPIRY_MARGIN_SECS: i64 = 10;

/// OAuth credential as persisted on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) >= expires_at
        })
    }
}

impl From<Token> for Credential {
    fn from(token: Token) -> Self {
        let mut scopes: Vec<String> = token.scopes.into_iter().collect();
        scopes.sort();

        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
            scopes,
        }
    }
}

impl From<Credential> for Token {
    fn from(credential: Credential) -> Self {
        let expires_in = credential
            .expires_at
            .map(|at| (at - Utc::now()).max(chrono::Duration::zero()))
            .unwrap_or_else(chrono::Duration::zero);

        Token {
            access_token: credential.access_token,
            expires_in,
            expires_at: credential.expires_at,
            refresh_token: credential.refresh_token,
            scopes: credential.scopes.into_iter().collect(),
        }
    }
}

/// Read the credential stored at `path`.
///
/// A missing file is reported as [`LyricsError::CredentialNotFound`] so the
/// caller can start the authorization flow instead of failing.
pub fn load(path: &Path) -> Result<Credential> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LyricsError::CredentialNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&contents).map_err(|source| LyricsError::CredentialParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Persist `credential` at `path` with owner-only permissions.
///
/// The JSON is written to a temporary file next to `path` and renamed over it,
/// so readers see either the old credential or the new one.
pub fn save(path: &Path, credential: &Credential) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // NamedTempFile is created 0600 on unix and removed on drop
    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut file, credential)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;

    file.persist(path).map_err(|e| LyricsError::IoError(e.error))?;

    log::info!("Saved credential to {:?}", path);
    Ok(())
}
