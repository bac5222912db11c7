//! Replaces the host default route with one through the tunnel device.

use convpn_lib::introspect;

use crate::error::Error;
use crate::net_ops::NetOps;

pub async fn install_default_route(net: &impl NetOps, tun_device: &str) -> Result<(), Error> {
    let table = net.ip_route_show_all().await?;
    if let Some(line) = introspect::default_route_line(&table) {
        // "already present" on add is not fatal; deleting first avoids it entirely
        let _ = net.ip_route_del_line(&format!("default {line}")).await;
    }
    net.ip_route_add_default_dev(tun_device).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net_ops::mocks::{MockNetOps, NetOpsState};

    #[tokio::test]
    async fn replaces_existing_default_route_with_tunnel_device() -> anyhow::Result<()> {
        let net = MockNetOps::with_state(NetOpsState {
            routes: vec!["default via 192.168.1.1 dev eth0".to_string()],
            ..Default::default()
        });

        install_default_route(&net, "tun0").await?;

        let state = net.state.lock().unwrap();
        assert_eq!(state.routes, vec!["default dev tun0".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn installs_default_route_when_none_exists() -> anyhow::Result<()> {
        let net = MockNetOps::new();
        install_default_route(&net, "tun0").await?;
        let state = net.state.lock().unwrap();
        assert_eq!(state.routes, vec!["default dev tun0".to_string()]);
        Ok(())
    }
}
