use std::process::Command;

use crate::error::{LyricsError, Result};

const NO_ARGS: &[&str] = &[];
const WINDOWS_ARGS: &[&str] = &["url.dll,FileProtocolHandler"];

/// Program and leading arguments that open a URL on the given OS family
pub fn command_for(os: &str) -> Option<(&'static str, &'static [&'static str])> {
    match os {
        "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Some(("xdg-open", NO_ARGS)),
        "windows" => Some(("rundll32", WINDOWS_ARGS)),
        "macos" => Some(("open", NO_ARGS)),
        _ => None,
    }
}

/// Open a URL in the default browser
pub fn open(url: &str) -> Result<()> {
    let os = std::env::consts::OS;
    let (program, args) =
        command_for(os).ok_or_else(|| LyricsError::UnsupportedPlatform(os.to_string()))?;

    log::debug!("Opening browser with {}", program);

    Command::new(program)
        .args(args)
        .arg(url)
        .spawn()
        .map_err(LyricsError::BrowserLaunch)?;

    Ok(())
}
