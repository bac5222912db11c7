//! The Connection Orchestrator: drives a location from a cold journal to a
//! verified, monitored tunnel. Each state transition emits a [`Event`] on an
//! internal channel so the control socket can report live progress without
//! polling internal state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;

use convpn_lib::credentials::Credentials;
use convpn_lib::introspect;
use convpn_lib::journal::{Action, Journal};
use convpn_lib::ovpn::Location;
use convpn_lib::session::{ForwardedPort, Session};

use crate::error::Error;
use crate::iptables_ops::IptablesOps;
use crate::journal_handle::JournalHandle;
use crate::mutators;
use crate::mutators::firewall::KillSwitchParams;
use crate::net_ops::NetOps;
use crate::netcheck;
use crate::openvpn;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const CONNECT_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(10);
const IP_VERIFY_ROUNDS: u32 = 3;
const IP_VERIFY_GAP: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub enum Event {
    Progress(String),
    Setback(String),
}

pub struct ConnectParams<'a> {
    pub location: &'a Location,
    pub credentials: Option<&'a Credentials>,
    pub log_path: PathBuf,
    pub block_doh: bool,
    pub block_lan: bool,
}

fn emit(events: Option<&mpsc::UnboundedSender<Event>>, event: Event) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Runs the full PREPARE → LAUNCH → POST_UP → VERIFIED → UP sequence.
/// On any named failure mode, returns `Err` without attempting cleanup
/// itself — the caller decides whether to invoke Cleanup with
/// `vpn_started` as the failure scope.
pub async fn connect(
    net: &impl NetOps,
    ipt4: &impl IptablesOps,
    ipt6: &impl IptablesOps,
    journal: &mut JournalHandle,
    params: &ConnectParams<'_>,
    events: Option<&mpsc::UnboundedSender<Event>>,
) -> Result<Session, Error> {
    emit(events, Event::Progress("acquiring baseline public IP".into()));
    let original_public_ip = netcheck::public_ip().await.unwrap_or_default();

    emit(events, Event::Progress("neutralizing managed connection".into()));
    let device_status = net.nmcli_device_status().await?;
    let (physical_iface, connection) = introspect::main_managed_connection(&device_status).ok_or(Error::NoInterface)?;
    mutators::neutralize_connection(net, journal, &connection).await?;
    journal.set(Action::PhysicalInterface, &physical_iface).await?;

    emit(events, Event::Progress("launching tunnel".into()));
    let (log, tunnel_pid) = launch_with_retries(params.location, &params.log_path, params.credentials).await?;
    journal.set(Action::VpnStarted, true).await?;

    emit(events, Event::Progress("applying pushed DNS".into()));
    let tun_device = introspect::tun_interface(&log).ok_or(Error::NoInterface)?;
    let pushed_dns: Vec<String> = introspect::pushed_dns_servers(&log).iter().map(ToString::to_string).collect();
    mutators::apply_dns(net, journal, &tun_device, &pushed_dns).await?;

    emit(events, Event::Progress("installing kill switch".into()));
    let remote = introspect::remote_endpoint(&log).ok_or(Error::NoRemoteEndpoint)?;
    let route_table = net.ip_route_show_all().await?;
    let local_subnet = introspect::local_subnet(&route_table, &physical_iface);
    let kill_switch_params = KillSwitchParams {
        physical_iface: &physical_iface,
        tun_iface: &tun_device,
        remote_ip: &remote.ip,
        local_subnet: local_subnet.as_deref(),
        block_lan: params.block_lan,
        block_doh: params.block_doh,
    };
    mutators::install_kill_switch(net, ipt4, ipt6, journal, &kill_switch_params).await?;

    emit(events, Event::Progress("installing tunnel default route".into()));
    mutators::install_default_route(net, &tun_device).await?;

    emit(events, Event::Progress("verifying reachability".into()));
    if !net.ping(&remote.ip).await {
        emit(events, Event::Setback("ping reachability check failed".into()));
        return Err(Error::NoRemoteEndpoint);
    }

    emit(events, Event::Progress("verifying public IP changed".into()));
    let (expected_public_ip, dns_fallback_active) =
        verify_public_ip_changed(net, journal, &tun_device, &pushed_dns, &original_public_ip).await?;

    let internal_ip = introspect::internal_ip(&log).unwrap_or_default();
    emit(events, Event::Progress("querying port-forward status".into()));
    let forwarded_port = netcheck::forwarded_port(&internal_ip).await;

    let mut session = Session::new(params.location.name.clone(), original_public_ip, expected_public_ip, internal_ip);
    session.forwarded_port = forwarded_port;
    session.dns_fallback_active = dns_fallback_active;
    session.tunnel_pid = tunnel_pid;
    Ok(session)
}

/// Returns the tunnel's log contents and OS pid once `wait_for_up`
/// confirms the tunnel came up. The `Child` handle itself is dropped on
/// success; liveness is checked by pid from then on, and termination goes
/// through `net.killall` in Cleanup rather than `Child::kill`.
async fn launch_with_retries(location: &Location, log_path: &Path, credentials: Option<&Credentials>) -> Result<(String, u32), Error> {
    let mut last_err = None;
    for attempt in 1..=CONNECT_ATTEMPTS {
        let mut tunnel = openvpn::spawn(&location.path, log_path, credentials).await?;
        let pid = tunnel.child.id().unwrap_or_default();
        match openvpn::wait_for_up(log_path, CONNECT_TIMEOUT).await {
            Ok(log) => return Ok((log, pid)),
            Err(e) => {
                let _ = tunnel.child.kill().await;
                last_err = Some(e);
                if attempt < CONNECT_ATTEMPTS {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }
    let _ = last_err;
    Err(Error::AllAttemptsFailed(CONNECT_ATTEMPTS))
}

/// Three rounds of public-IP verification with a DNS-fallback retry on the
/// final failure: prepend a public resolver, retry once, then restore.
async fn verify_public_ip_changed(
    net: &impl NetOps,
    journal: &mut JournalHandle,
    tun_device: &str,
    pushed_dns: &[String],
    original: &str,
) -> Result<(String, bool), Error> {
    for round in 0..IP_VERIFY_ROUNDS {
        if let Ok(observed) = netcheck::public_ip().await {
            if netcheck::assert_ip_changed(original, &observed).is_ok() {
                return Ok((observed, false));
            }
        }
        if round + 1 < IP_VERIFY_ROUNDS {
            tokio::time::sleep(IP_VERIFY_GAP).await;
        }
    }

    let mut fallback_servers = vec!["1.1.1.1".to_string()];
    fallback_servers.extend(pushed_dns.iter().cloned());
    mutators::resolvconf::lock_resolv_conf(journal, &fallback_servers).await?;
    let retried = netcheck::public_ip().await;
    mutators::resolvconf::restore_resolv_conf(&journal.journal).await?;

    match retried {
        Ok(observed) if netcheck::assert_ip_changed(original, &observed).is_ok() => {
            net.resolvectl_flush_caches().await.ok();
            let _ = tun_device;
            Ok((observed, true))
        }
        _ => Err(Error::PublicIpUnchanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_variants_are_constructible() {
        let _ = Event::Progress("x".into());
        let _ = Event::Setback("y".into());
    }
}
