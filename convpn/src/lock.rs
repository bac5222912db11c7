//! Ensures a single supervisor runs per host, and hands a stale predecessor's
//! Journal to Cleanup before this instance does anything else.

use std::path::Path;

use convpn_lib::journal::Journal;

use crate::cleanup;
use crate::error::Error;
use crate::iptables_ops::IptablesOps;
use crate::net_ops::NetOps;

#[derive(Debug)]
pub enum LockOutcome {
    /// No previous instance: acquired the lock cleanly for `pid`.
    Fresh,
    /// A previous instance died without cleaning up; its Journal was
    /// adopted and Cleanup has already run against it.
    AdoptedStale,
}

/// A zero-signal probe: `kill(pid, 0)` succeeds (or is denied, which still
/// proves the pid is live) when the process exists, and fails with ESRCH
/// when it doesn't.
pub(crate) fn pid_is_live(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    let errno = std::io::Error::last_os_error().raw_os_error();
    errno != Some(libc::ESRCH)
}

/// Returns `Err` if a live instance already holds the journal path.
/// Otherwise adopts and cleans up any stale journal, then returns the
/// outcome for the caller to log.
pub async fn acquire(
    net: &impl NetOps,
    ipt4: &impl IptablesOps,
    ipt6: &impl IptablesOps,
    journal_path: &Path,
    pid: u32,
) -> Result<LockOutcome, Error> {
    match Journal::load_opt(journal_path).await {
        Some(stale) if pid_is_live(stale.pid) => Err(Error::General(format!("convpn already running (pid {})", stale.pid))),
        Some(stale) => {
            cleanup::run(net, ipt4, ipt6, &stale, false).await?;
            Journal::delete(journal_path).await?;
            Ok(LockOutcome::AdoptedStale)
        }
        None => Ok(LockOutcome::Fresh),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iptables_ops::mocks::MockIptablesOps;
    use crate::net_ops::mocks::MockNetOps;

    #[test]
    fn pid_is_live_true_for_current_process() {
        assert!(pid_is_live(std::process::id()));
    }

    #[test]
    fn pid_is_live_false_for_unlikely_pid() {
        assert!(!pid_is_live(u32::MAX - 1));
    }

    #[tokio::test]
    async fn acquire_is_fresh_when_no_journal_present() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("convpn.lock");
        let net = MockNetOps::new();
        let ipt4 = MockIptablesOps::new();
        let ipt6 = MockIptablesOps::new();

        let outcome = acquire(&net, &ipt4, &ipt6, &path, 1).await?;
        assert!(matches!(outcome, LockOutcome::Fresh));
        Ok(())
    }

    #[tokio::test]
    async fn acquire_rejects_live_predecessor() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("convpn.lock");
        let mut journal = Journal::new(std::process::id());
        journal.save(&path).await?;
        let net = MockNetOps::new();
        let ipt4 = MockIptablesOps::new();
        let ipt6 = MockIptablesOps::new();

        let err = acquire(&net, &ipt4, &ipt6, &path, 1).await.expect_err("should reject live lock");
        assert!(matches!(err, Error::General(_)));
        Ok(())
    }

    #[tokio::test]
    async fn acquire_adopts_and_deletes_stale_journal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("convpn.lock");
        let mut journal = Journal::new(u32::MAX - 1);
        journal.save(&path).await?;
        let net = MockNetOps::new();
        let ipt4 = MockIptablesOps::new();
        let ipt6 = MockIptablesOps::new();

        let outcome = acquire(&net, &ipt4, &ipt6, &path, 1).await?;
        assert!(matches!(outcome, LockOutcome::AdoptedStale));
        assert!(!path.exists());
        Ok(())
    }
}
