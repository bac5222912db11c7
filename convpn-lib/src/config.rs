//! Persisted user configuration: selected language, last location, display
//! options, encrypted credentials, and connection flags.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::io;
use std::path::Path;

use crate::credentials::EncryptedCredentials;

pub const DEFAULT_PATH: &str = "/etc/convpn/config.json";
pub const ENV_VAR: &str = "CONVPN_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub last_location: Option<String>,
    pub credentials: Option<EncryptedCredentials>,
    pub post_connect_exe: Option<String>,
    #[serde(default)]
    pub block_doh: bool,
    #[serde(default)]
    pub block_lan: bool,
}

/// Reads the configuration file, returning the default configuration when
/// the file does not exist yet (first run).
pub async fn read(path: &Path) -> Result<Config, Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(Error::IO(e)),
    }
}

/// Writes the configuration file, tightening its permissions to owner-only
/// after write rather than relying on the process umask.
pub async fn write(path: &Path, config: &Config) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, json).await?;
    set_owner_only(path).await?;
    Ok(())
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> Result<(), Error> {
    Ok(())
}
