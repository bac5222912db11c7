//! Monitor Loop: one liveness pass every 45 seconds. On any negative
//! result, tears the session down and asks the orchestrator to reconnect;
//! on repeated failure, calls Cleanup(failure) and stops.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use convpn_lib::introspect;
use convpn_lib::session::Session;

use crate::error::Error;
use crate::net_ops::NetOps;
use crate::netcheck;

pub const INTERVAL: Duration = Duration::from_secs(45);

#[derive(Debug, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    TunnelProcessGone,
    NoTunnelRoute,
    PublicIpDrifted,
}

/// True for a classic `default ... dev tun0` route, or for the split-default
/// pair (`0.0.0.0/1` + `128.0.0.0/1`, both through a TUN device) that
/// `redirect-gateway def1` installs instead of a literal default route.
fn has_tunnel_default_route(route_table: &str) -> bool {
    let lines: Vec<&str> = route_table.lines().collect();
    if lines.iter().any(|l| l.starts_with("default ") && l.contains("dev tun")) {
        return true;
    }
    let lower_half = lines.iter().any(|l| l.contains("0.0.0.0/1") && l.contains("dev tun"));
    let upper_half = lines.iter().any(|l| l.contains("128.0.0.0/1") && l.contains("dev tun"));
    lower_half && upper_half
}

/// Checks whether the tunnel process is still running, a default route
/// through a TUN device still exists, and the public IP still matches the
/// session's expected VPN IP.
pub async fn check_liveness(net: &impl NetOps, tunnel_pid_alive: bool, session: &Session) -> Liveness {
    if !tunnel_pid_alive {
        return Liveness::TunnelProcessGone;
    }

    let route_table = net.ip_route_show_all().await.unwrap_or_default();
    if !has_tunnel_default_route(&route_table) {
        return Liveness::NoTunnelRoute;
    }

    if let Ok(observed) = netcheck::public_ip().await {
        if observed != session.expected_public_ip {
            return Liveness::PublicIpDrifted;
        }
    }

    Liveness::Alive
}

/// Runs the 45-second liveness loop until cancelled or a terminal check
/// returns a non-`Alive` liveness, whichever comes first. The caller is
/// responsible for reacting to the returned liveness with reconnect logic;
/// this function only owns the polling cadence.
pub async fn run_until_negative(
    net: &impl NetOps,
    session: Arc<Mutex<Session>>,
    token: CancellationToken,
) -> Result<Liveness, Error> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(Liveness::Alive),
            _ = tokio::time::sleep(INTERVAL) => {}
        }

        let snapshot = session.lock().unwrap().clone();
        let tunnel_pid_alive = crate::lock::pid_is_live(snapshot.tunnel_pid);
        let liveness = check_liveness(net, tunnel_pid_alive, &snapshot).await;
        if liveness != Liveness::Alive {
            return Ok(liveness);
        }
    }
}

/// Dominant pattern across recent route corrections, formatted the way the
/// status view reports it. Mirrors `Session::correction_pattern` directly;
/// kept here so the monitor's status rendering has a single call site.
pub fn correction_pattern_summary(session: &Session, now: std::time::SystemTime) -> String {
    match session.correction_pattern(now) {
        Some(period) => format!("pattern detected: corrections roughly every {}", humantime::format_duration(period)),
        None => "no pattern".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net_ops::mocks::{MockNetOps, NetOpsState};

    fn session() -> Session {
        Session::new("loc".into(), "1.2.3.4".into(), "5.6.7.8".into(), "10.8.0.2".into())
    }

    #[tokio::test]
    async fn dead_tunnel_process_is_detected_without_touching_network() {
        let net = MockNetOps::new();
        let liveness = check_liveness(&net, false, &session()).await;
        assert_eq!(liveness, Liveness::TunnelProcessGone);
    }

    #[tokio::test]
    async fn missing_tunnel_route_is_detected() {
        let net = MockNetOps::with_state(NetOpsState {
            routes: vec!["default via 192.168.1.1 dev eth0".to_string()],
            ..Default::default()
        });
        let liveness = check_liveness(&net, true, &session()).await;
        assert_eq!(liveness, Liveness::NoTunnelRoute);
    }

    #[test]
    fn split_default_route_pair_counts_as_a_tunnel_route() {
        let table = "0.0.0.0/1 via 10.8.0.1 dev tun0\n128.0.0.0/1 via 10.8.0.1 dev tun0\n";
        assert!(has_tunnel_default_route(table));
    }

    #[test]
    fn one_half_of_the_split_pair_alone_is_not_enough() {
        let table = "0.0.0.0/1 via 10.8.0.1 dev tun0\n";
        assert!(!has_tunnel_default_route(table));
    }

    #[test]
    fn correction_pattern_summary_reports_no_pattern_by_default() {
        let s = session();
        assert_eq!(correction_pattern_summary(&s, std::time::SystemTime::now()), "no pattern");
    }
}
