use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base mvgmvs config directory (~/.config/mvgmvs/ on Unix, %APPDATA%\mvgmvs on Windows)
pub fn mvgmvs() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("mvgmvs"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("mvgmvs"))
    }
}

/// Global mvgmvs.json config file path
pub fn mvgmvs_json() -> Result<PathBuf> {
    Ok(mvgmvs()?.join("mvgmvs.json"))
}
