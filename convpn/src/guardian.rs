//! Route Guardian: while running, no non-tunnel default route may persist
//! for more than one polling interval. Polling is adaptive, tightening
//! after recent correction activity.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use convpn_lib::introspect;
use convpn_lib::session::Session;

use crate::net_ops::NetOps;

const LOW_ALERT_INTERVAL: Duration = Duration::from_secs(2);
const HIGH_ALERT_INTERVAL: Duration = Duration::from_secs(1);

/// Runs until `token` is cancelled. Every correction is recorded on
/// `session` so the monitor loop's pattern analysis and the guardian's own
/// polling cadence stay in sync with the same counters.
pub async fn run(net: &impl NetOps, session: Arc<Mutex<Session>>, token: CancellationToken) {
    loop {
        if let Ok(table) = net.ip_route_show_all().await {
            if let Some(stray) = introspect::non_tunnel_default_routes(&table).into_iter().next() {
                let _ = net.ip_route_del_line(&stray).await;
                session.lock().unwrap().record_correction(SystemTime::now());
            }
        }

        let interval = {
            let s = session.lock().unwrap();
            if s.guardian_high_alert(SystemTime::now()) { HIGH_ALERT_INTERVAL } else { LOW_ALERT_INTERVAL }
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net_ops::mocks::{MockNetOps, NetOpsState};

    #[tokio::test]
    async fn corrects_one_stray_default_route_per_tick_then_stops_on_cancel() {
        let net = MockNetOps::with_state(NetOpsState {
            routes: vec!["default via 192.168.1.1 dev eth0".to_string(), "default dev tun0".to_string()],
            ..Default::default()
        });
        let session = Arc::new(Mutex::new(Session::new("loc".into(), "1.2.3.4".into(), "5.6.7.8".into(), "10.8.0.2".into())));
        let token = CancellationToken::new();

        let guardian_token = token.clone();
        let net_clone = net.clone();
        let session_clone = session.clone();
        let handle = tokio::spawn(async move { run(&net_clone, session_clone, guardian_token).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        let s = session.lock().unwrap();
        assert!(s.corrections >= 1);
    }
}
