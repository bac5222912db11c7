//! Applies pushed DNS servers to the tunnel interface using whichever
//! backend the host supports, recording the choice in the journal so
//! cleanup can dispatch the matching restore without re-probing.

use convpn_lib::journal::Action;

use crate::error::Error;
use crate::journal_handle::JournalHandle;
use crate::net_ops::NetOps;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Backend {
    SystemdResolved,
    NetworkManager,
}

pub async fn apply_dns(
    net: &impl NetOps,
    journal: &mut JournalHandle,
    tun_device: &str,
    servers: &[String],
) -> Result<Backend, Error> {
    if servers.is_empty() {
        return Err(Error::NoPushedDns);
    }

    let backend = if net.resolvectl_available().await { Backend::SystemdResolved } else { Backend::NetworkManager };

    journal.set(Action::ResolvedBackend, backend).await?;
    journal.set(Action::DnsApplied, true).await?;
    journal.set(Action::TunDevice, tun_device).await?;

    match backend {
        Backend::SystemdResolved => {
            net.resolvectl_dns(tun_device, servers).await?;
            net.resolvectl_domain(tun_device).await?;
            net.resolvectl_default_route(tun_device).await?;
            net.resolvectl_flush_caches().await?;
        }
        Backend::NetworkManager => {
            if net.nmcli_set_dns(tun_device, servers).await.is_err() {
                // NetworkManager can't manage the tun device directly on some
                // setups; fall back to replacing /etc/resolv.conf and locking it.
                crate::mutators::resolvconf::lock_resolv_conf(journal, servers).await?;
            }
        }
    }

    Ok(backend)
}

pub async fn restore(net: &impl NetOps, journal: &convpn_lib::journal::Journal) -> Result<(), Error> {
    let Some(backend) = journal.get::<Backend>(Action::ResolvedBackend) else {
        return Ok(());
    };
    if backend == Backend::SystemdResolved {
        let tun_device = journal.get::<String>(Action::TunDevice).unwrap_or_default();
        net.resolvectl_revert(&tun_device).await?;
        net.resolvectl_flush_caches().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net_ops::mocks::{MockNetOps, NetOpsState};
    use convpn_lib::journal::Journal;

    #[tokio::test]
    async fn empty_dns_list_aborts_before_touching_host_state() {
        let net = MockNetOps::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut journal = JournalHandle::new(dir.path().join("convpn.lock"), Journal::new(1));
        let err = apply_dns(&net, &mut journal, "tun0", &[]).await.expect_err("should error");
        assert!(matches!(err, Error::NoPushedDns));
    }

    #[tokio::test]
    async fn prefers_systemd_resolved_when_available() -> anyhow::Result<()> {
        let net = MockNetOps::with_state(NetOpsState { resolved_available: true, ..Default::default() });
        let dir = tempfile::tempdir()?;
        let mut journal = JournalHandle::new(dir.path().join("convpn.lock"), Journal::new(1));

        let backend = apply_dns(&net, &mut journal, "tun0", &["10.8.0.1".to_string()]).await?;

        assert_eq!(backend, Backend::SystemdResolved);
        assert_eq!(journal.get::<bool>(Action::DnsApplied), Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn falls_back_to_network_manager_without_resolved() -> anyhow::Result<()> {
        let net = MockNetOps::new();
        let dir = tempfile::tempdir()?;
        let mut journal = JournalHandle::new(dir.path().join("convpn.lock"), Journal::new(1));

        let backend = apply_dns(&net, &mut journal, "tun0", &["10.8.0.1".to_string()]).await?;

        assert_eq!(backend, Backend::NetworkManager);
        Ok(())
    }
}
