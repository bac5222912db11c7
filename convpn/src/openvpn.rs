//! Spawns and supervises the external `openvpn` process and tails its log.

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::{Duration, Instant};

use std::path::Path;
use std::process::Stdio;

use convpn_lib::credentials::Credentials;
use convpn_lib::introspect;

use crate::error::Error;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
pub const CONNECT_ATTEMPTS: u32 = 3;
pub const RETRY_BACKOFF: Duration = Duration::from_secs(10);

pub struct TunnelProcess {
    pub child: Child,
}

/// Launches `openvpn` against the given config, piping credentials on
/// stdin rather than writing them to disk, and redirecting stdout/stderr
/// into `log_path` for the introspector to read.
pub async fn spawn(ovpn_path: &Path, log_path: &Path, credentials: Option<&Credentials>) -> Result<TunnelProcess, Error> {
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    let log_file_err = log_file.try_clone()?;

    let mut cmd = Command::new("openvpn");
    cmd.arg("--config").arg(ovpn_path);
    if credentials.is_some() {
        cmd.args(["--auth-user-pass", "-", "--auth-nocache"]);
    }
    cmd.stdin(if credentials.is_some() { Stdio::piped() } else { Stdio::null() });
    cmd.stdout(Stdio::from(log_file));
    cmd.stderr(Stdio::from(log_file_err));

    let mut child = cmd.spawn()?;

    if let (Some(creds), Some(mut stdin)) = (credentials, child.stdin.take()) {
        let payload = format!("{}\n{}\n", creds.username, creds.password);
        stdin.write_all(payload.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    Ok(TunnelProcess { child })
}

/// Polls the log file until the init-sequence marker appears or the
/// timeout elapses, whichever comes first.
pub async fn wait_for_up(log_path: &Path, timeout: Duration) -> Result<String, Error> {
    let deadline = Instant::now() + timeout;
    loop {
        let log = tokio::fs::read_to_string(log_path).await.unwrap_or_default();
        if introspect::tunnel_is_up(&log) {
            return Ok(log);
        }
        if Instant::now() >= deadline {
            return Err(Error::ConnectTimeout);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
