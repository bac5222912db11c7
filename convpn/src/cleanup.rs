//! The reverse state machine: drives host state back to the snapshot
//! recorded in the journal. The only component allowed to enter fail-closed
//! mode, and the only place the journal file is ever deleted on success.

use convpn_lib::dirs;
use convpn_lib::journal::{Action, Journal};

use crate::error::Error;
use crate::iptables_ops::IptablesOps;
use crate::mutators;
use crate::net_ops::NetOps;

/// Drives every recorded mutation back to its pre-connection state.
///
/// `failure` marks whether the tunnel was mid-session when this ran: if the
/// tunnel process was ever journaled as started and this is a failure path,
/// the host is left fail-closed (`nmcli networking off`) rather than
/// returned to its original connectivity, since a half-restored route table
/// is worse than no connectivity at all.
pub async fn run(
    net: &impl NetOps,
    ipt4: &impl IptablesOps,
    ipt6: &impl IptablesOps,
    journal: &Journal,
    failure: bool,
) -> Result<(), Error> {
    let _ = net.killall("openvpn").await;

    if let Err(e) = mutators::teardown_kill_switch(net, ipt4, ipt6, journal).await {
        tracing::warn!(error = %e, "kill switch teardown failed during cleanup");
    }

    if let Err(e) = mutators::restore_resolv_conf(journal).await {
        tracing::warn!(error = %e, "resolv.conf restore failed during cleanup");
    }

    if let Err(e) = mutators::dns::restore(net, journal).await {
        tracing::warn!(error = %e, "dns backend restore failed during cleanup");
    }

    let vpn_started = journal.get::<bool>(Action::VpnStarted).unwrap_or(false);

    if vpn_started && failure {
        if let Err(e) = net.nmcli_networking_off().await {
            tracing::error!(error = %e, "failed to fail-close networking after a failed connection attempt");
        }
    } else if journal.contains(Action::NmConnection) {
        if let Err(e) = mutators::restore_connection(net, journal).await {
            tracing::warn!(error = %e, "NetworkManager connection restore failed during cleanup");
        }
    }

    delete_session_files().await;

    Ok(())
}

async fn delete_session_files() {
    for name in ["openvpn.log", "forwarded_port.txt", "reconnections.log", "convpn_dns.log", "convpn_dns_backup.json"] {
        if let Ok(path) = dirs::cache_dir(name) {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}
