//! Keeps the root privilege the supervisor was started with from expiring
//! mid-session by periodically touching the sudo timestamp, the way long
//! running privileged daemons avoid being re-prompted for a password.

use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use convpn_lib::shell_command_ext::{Logs, ShellCommandExt};

pub const INTERVAL: Duration = Duration::from_secs(60);

/// Runs `sudo -v` on a fixed interval until cancelled. A single failed
/// refresh is not fatal — it's logged and retried next tick.
pub async fn run(token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(INTERVAL) => {}
        }

        if let Err(e) = Command::new("sudo").arg("-v").run_stdout(Logs::Suppress).await {
            tracing::warn!(error = %e, "sudo timestamp refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_promptly_once_cancelled() {
        let token = CancellationToken::new();
        let inner = token.clone();
        let handle = tokio::spawn(async move { run(inner).await });

        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "sudo keeper should join promptly after cancellation");
    }
}
