//! The kill switch: once installed, every packet must egress through
//! loopback, the tunnel, the VPN server endpoint on the physical link, or
//! (if LAN is allowed) the local subnet. Everything else is dropped on
//! both IPv4 and IPv6.

use convpn_lib::journal::Action;

use crate::error::Error;
use crate::iptables_ops::IptablesOps;
use crate::journal_handle::JournalHandle;
use crate::net_ops::NetOps;

const DOH_RESOLVER_IPS: &[&str] =
    &["1.1.1.1", "1.0.0.1", "8.8.8.8", "8.8.4.4", "9.9.9.9", "149.112.112.112"];

const BUILTIN_CHAINS: &[&str] = &["INPUT", "FORWARD", "OUTPUT"];

pub struct KillSwitchParams<'a> {
    pub physical_iface: &'a str,
    pub tun_iface: &'a str,
    pub remote_ip: &'a str,
    pub local_subnet: Option<&'a str>,
    pub block_lan: bool,
    pub block_doh: bool,
}

/// Flushes and deletes every chain the three built-ins don't own, so a
/// stray UFW or prior-run chain can't hold an ACCEPT rule above our DROP
/// policy.
fn delete_user_chains(ipt: &dyn IptablesOps) -> Result<(), Error> {
    for chain in ipt.list_chains().map_err(Error::IpTables)? {
        if BUILTIN_CHAINS.contains(&chain.as_str()) {
            continue;
        }
        let _ = ipt.flush_chain(&chain);
        ipt.delete_chain(&chain).map_err(Error::IpTables)?;
    }
    Ok(())
}

/// Applies the kill switch identically to both the IPv4 and IPv6 tables:
/// default-deny, loopback and tunnel exceptions. The remote-endpoint and
/// DoH-resolver exceptions are IPv4-literal and are layered on top of the
/// IPv4 table only by the caller.
fn deny_by_default(ipt: &dyn IptablesOps, tun_iface: &str) -> Result<(), Error> {
    delete_user_chains(ipt)?;
    for chain in BUILTIN_CHAINS {
        ipt.flush_chain(chain).map_err(Error::IpTables)?;
        ipt.set_policy(chain, "DROP").map_err(Error::IpTables)?;
    }
    ipt.append("INPUT", "-i lo -j ACCEPT").map_err(Error::IpTables)?;
    ipt.append("OUTPUT", "-o lo -j ACCEPT").map_err(Error::IpTables)?;
    ipt.append("OUTPUT", &format!("-o {tun_iface} -j ACCEPT")).map_err(Error::IpTables)?;
    ipt.append("INPUT", &format!("-i {tun_iface} -j ACCEPT")).map_err(Error::IpTables)?;
    Ok(())
}

pub async fn install_kill_switch(
    net: &impl NetOps,
    ipt4: &dyn IptablesOps,
    ipt6: &dyn IptablesOps,
    journal: &mut JournalHandle,
    params: &KillSwitchParams<'_>,
) -> Result<(), Error> {
    if params.remote_ip.is_empty() {
        return Err(Error::NoRemoteEndpoint);
    }

    let ufw_status = net.ufw_status().await?;
    let ufw_was_active = ufw_status.lines().next().map(|l| l.trim() == "Status: active").unwrap_or(false);
    if ufw_was_active {
        journal.set(Action::UfwWasActive, true).await?;
        net.ufw_disable().await?;
    }

    journal.set(Action::FirewallIface, params.physical_iface).await?;

    deny_by_default(ipt4, params.tun_iface)?;
    deny_by_default(ipt6, params.tun_iface)?;

    if !params.block_lan {
        if let Some(subnet) = params.local_subnet {
            ipt4.append("OUTPUT", &format!("-d {subnet} -j ACCEPT")).map_err(Error::IpTables)?;
            ipt4.append("INPUT", &format!("-s {subnet} -j ACCEPT")).map_err(Error::IpTables)?;
        }
    }

    ipt4.append("OUTPUT", &format!("-o {} -d {} -j ACCEPT", params.physical_iface, params.remote_ip))
        .map_err(Error::IpTables)?;
    ipt4.append("INPUT", &format!("-i {} -s {} -j ACCEPT", params.physical_iface, params.remote_ip))
        .map_err(Error::IpTables)?;

    if params.block_doh {
        journal.set(Action::DohBlocked, true).await?;
        for ip in DOH_RESOLVER_IPS {
            ipt4.insert("OUTPUT", 1, &format!("-p tcp --dport 443 -d {ip} -j DROP")).map_err(Error::IpTables)?;
        }
    }

    Ok(())
}

pub async fn teardown_kill_switch(
    net: &impl NetOps,
    ipt4: &dyn IptablesOps,
    ipt6: &dyn IptablesOps,
    journal: &convpn_lib::journal::Journal,
) -> Result<(), Error> {
    for ipt in [ipt4, ipt6] {
        for chain in BUILTIN_CHAINS {
            let _ = ipt.set_policy(chain, "ACCEPT");
            let _ = ipt.flush_chain(chain);
        }
        let _ = delete_user_chains(ipt);
    }

    if journal.get::<bool>(Action::UfwWasActive).unwrap_or(false) {
        net.ufw_enable().await?;
    }
    Ok(())
}
