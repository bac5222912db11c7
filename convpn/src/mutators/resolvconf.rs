//! Locks `/etc/resolv.conf` to the pushed DNS servers when neither
//! systemd-resolved nor a direct NetworkManager DNS write is available.

use tokio::process::Command;

use convpn_lib::journal::Action;
use convpn_lib::shell_command_ext::{Logs, ShellCommandExt};

use crate::error::Error;
use crate::journal_handle::JournalHandle;

const RESOLV_CONF: &str = "/etc/resolv.conf";
const RESOLV_CONF_BACKUP: &str = "/etc/resolv.conf.bak";

pub async fn lock_resolv_conf(journal: &mut JournalHandle, servers: &[String]) -> Result<(), Error> {
    let contents: String = servers.iter().map(|s| format!("nameserver {s}\n")).collect();

    journal.set(Action::BackupCreated, true).await?;
    Command::new("cp").args([RESOLV_CONF, RESOLV_CONF_BACKUP]).run_stdout(Logs::Suppress).await.ok();

    journal.set(Action::ResolvLocked, true).await?;
    Command::new("chattr").args(["-i", RESOLV_CONF]).run_stdout(Logs::Suppress).await.ok();
    tokio::fs::write(RESOLV_CONF, contents).await?;
    Command::new("chattr").args(["+i", RESOLV_CONF]).run_stdout(Logs::Print).await?;
    Ok(())
}

pub async fn restore_resolv_conf(journal: &convpn_lib::journal::Journal) -> Result<(), Error> {
    if !journal.get::<bool>(Action::ResolvLocked).unwrap_or(false) {
        return Ok(());
    }
    Command::new("chattr").args(["-i", RESOLV_CONF]).run_stdout(Logs::Suppress).await.ok();
    Command::new("mv").args([RESOLV_CONF_BACKUP, RESOLV_CONF]).run_stdout(Logs::Suppress).await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convpn_lib::journal::Journal;

    #[tokio::test]
    async fn restore_is_a_no_op_when_never_locked() -> anyhow::Result<()> {
        let journal = Journal::new(1);
        restore_resolv_conf(&journal).await?;
        Ok(())
    }
}
