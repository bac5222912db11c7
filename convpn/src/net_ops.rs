//! Abstraction over every external command the supervisor shells out to,
//! so mutators are testable without root and without a real network.
//!
//! Production code uses [`RealNetOps`], which runs `ip`, `nmcli`,
//! `resolvectl`, `ufw`, `ping` and `killall` via [`ShellCommandExt`].
//! Tests use the stateful mock in `net_ops::mocks`.

use async_trait::async_trait;
use tokio::process::Command;

use convpn_lib::shell_command_ext::{Logs, ShellCommandExt};

use crate::error::Error;

#[async_trait]
pub trait NetOps: Send + Sync {
    async fn ip_route_show_all(&self) -> Result<String, Error>;
    async fn ip_route_add_default_dev(&self, device: &str) -> Result<(), Error>;
    async fn ip_route_del_line(&self, route_line: &str) -> Result<(), Error>;

    async fn nmcli_device_status(&self) -> Result<String, Error>;
    async fn nmcli_get_conn_property(&self, connection: &str, property: &str) -> Result<String, Error>;
    async fn nmcli_set_conn_property(&self, connection: &str, property: &str, value: &str) -> Result<(), Error>;
    async fn nmcli_up(&self, connection: &str) -> Result<(), Error>;
    async fn nmcli_networking_off(&self) -> Result<(), Error>;
    async fn nmcli_set_dns(&self, device_connection: &str, servers: &[String]) -> Result<(), Error>;

    async fn resolvectl_available(&self) -> bool;
    async fn resolvectl_dns(&self, iface: &str, servers: &[String]) -> Result<(), Error>;
    async fn resolvectl_domain(&self, iface: &str) -> Result<(), Error>;
    async fn resolvectl_default_route(&self, iface: &str) -> Result<(), Error>;
    async fn resolvectl_flush_caches(&self) -> Result<(), Error>;
    async fn resolvectl_revert(&self, iface: &str) -> Result<(), Error>;

    async fn ufw_status(&self) -> Result<String, Error>;
    async fn ufw_disable(&self) -> Result<(), Error>;
    async fn ufw_enable(&self) -> Result<(), Error>;

    async fn ping(&self, ip: &str) -> bool;
    async fn killall(&self, process_name: &str) -> Result<(), Error>;
}

#[derive(Clone, Default)]
pub struct RealNetOps;

#[async_trait]
impl NetOps for RealNetOps {
    async fn ip_route_show_all(&self) -> Result<String, Error> {
        Ok(Command::new("ip").args(["route", "show"]).run_stdout(Logs::Print).await?)
    }

    async fn ip_route_add_default_dev(&self, device: &str) -> Result<(), Error> {
        Command::new("ip").args(["route", "add", "default", "dev", device]).run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn ip_route_del_line(&self, route_line: &str) -> Result<(), Error> {
        let mut cmd = Command::new("ip");
        cmd.arg("route").arg("del");
        for part in route_line.split_whitespace() {
            cmd.arg(part);
        }
        cmd.run_stdout(Logs::Suppress).await?;
        Ok(())
    }

    async fn nmcli_device_status(&self) -> Result<String, Error> {
        Ok(Command::new("nmcli").args(["-t", "device", "status"]).run_stdout(Logs::Print).await?)
    }

    async fn nmcli_get_conn_property(&self, connection: &str, property: &str) -> Result<String, Error> {
        Ok(Command::new("nmcli")
            .args(["-g", property, "connection", "show", connection])
            .run_stdout(Logs::Print)
            .await?)
    }

    async fn nmcli_set_conn_property(&self, connection: &str, property: &str, value: &str) -> Result<(), Error> {
        Command::new("nmcli")
            .args(["connection", "modify", connection, property, value])
            .run_stdout(Logs::Print)
            .await?;
        Ok(())
    }

    async fn nmcli_up(&self, connection: &str) -> Result<(), Error> {
        Command::new("nmcli").args(["connection", "up", connection]).run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn nmcli_networking_off(&self) -> Result<(), Error> {
        Command::new("nmcli").args(["networking", "off"]).run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn nmcli_set_dns(&self, device_connection: &str, servers: &[String]) -> Result<(), Error> {
        let joined = servers.join(",");
        Command::new("nmcli")
            .args(["connection", "modify", device_connection, "ipv4.dns", &joined, "ipv4.ignore-auto-dns", "yes"])
            .run_stdout(Logs::Print)
            .await?;
        Ok(())
    }

    async fn resolvectl_available(&self) -> bool {
        Command::new("resolvectl").arg("status").run_stdout(Logs::Suppress).await.is_ok()
    }

    async fn resolvectl_dns(&self, iface: &str, servers: &[String]) -> Result<(), Error> {
        let mut cmd = Command::new("resolvectl");
        cmd.arg("dns").arg(iface);
        for s in servers {
            cmd.arg(s);
        }
        cmd.run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn resolvectl_domain(&self, iface: &str) -> Result<(), Error> {
        Command::new("resolvectl").args(["domain", iface, "~."]).run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn resolvectl_default_route(&self, iface: &str) -> Result<(), Error> {
        Command::new("resolvectl").args(["default-route", iface, "yes"]).run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn resolvectl_flush_caches(&self) -> Result<(), Error> {
        Command::new("resolvectl").arg("flush-caches").run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn resolvectl_revert(&self, iface: &str) -> Result<(), Error> {
        Command::new("resolvectl").args(["revert", iface]).run_stdout(Logs::Suppress).await?;
        Ok(())
    }

    async fn ufw_status(&self) -> Result<String, Error> {
        Ok(Command::new("ufw").arg("status").run_stdout(Logs::Print).await?)
    }

    async fn ufw_disable(&self) -> Result<(), Error> {
        Command::new("ufw").arg("disable").run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn ufw_enable(&self) -> Result<(), Error> {
        Command::new("ufw").args(["--force", "enable"]).run_stdout(Logs::Print).await?;
        Ok(())
    }

    async fn ping(&self, ip: &str) -> bool {
        Command::new("ping").args(["-c", "1", "-W", "2", ip]).run(Logs::Suppress).await.is_ok()
    }

    async fn killall(&self, process_name: &str) -> Result<(), Error> {
        // killall returning non-zero because the process is already gone is not an error
        let _ = Command::new("killall").arg(process_name).run_stdout(Logs::Suppress).await;
        Ok(())
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct NetOpsState {
        pub routes: Vec<String>,
        pub conn_properties: HashMap<(String, String), String>,
        pub dns_by_iface: HashMap<String, Vec<String>>,
        pub resolved_available: bool,
        pub ufw_active: bool,
        pub networking_off: bool,
        pub killed: Vec<String>,
        pub fail_on: HashMap<String, String>,
    }

    impl NetOpsState {
        fn check_fail(&self, op: &str) -> Result<(), Error> {
            match self.fail_on.get(op) {
                Some(msg) => Err(Error::General(msg.clone())),
                None => Ok(()),
            }
        }
    }

    #[derive(Clone)]
    pub struct MockNetOps {
        pub state: Arc<Mutex<NetOpsState>>,
    }

    impl MockNetOps {
        pub fn new() -> Self {
            Self { state: Arc::new(Mutex::new(NetOpsState::default())) }
        }

        pub fn with_state(state: NetOpsState) -> Self {
            Self { state: Arc::new(Mutex::new(state)) }
        }
    }

    #[async_trait]
    impl NetOps for MockNetOps {
        async fn ip_route_show_all(&self) -> Result<String, Error> {
            let s = self.state.lock().unwrap();
            s.check_fail("ip_route_show_all")?;
            Ok(s.routes.join("\n"))
        }

        async fn ip_route_add_default_dev(&self, device: &str) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("ip_route_add_default_dev")?;
            s.routes.retain(|r| !r.starts_with("default "));
            s.routes.push(format!("default dev {device}"));
            Ok(())
        }

        async fn ip_route_del_line(&self, route_line: &str) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("ip_route_del_line")?;
            s.routes.retain(|r| r != route_line);
            Ok(())
        }

        async fn nmcli_device_status(&self) -> Result<String, Error> {
            Ok(String::new())
        }

        async fn nmcli_get_conn_property(&self, connection: &str, property: &str) -> Result<String, Error> {
            let s = self.state.lock().unwrap();
            s.check_fail("nmcli_get_conn_property")?;
            Ok(s.conn_properties.get(&(connection.to_string(), property.to_string())).cloned().unwrap_or_default())
        }

        async fn nmcli_set_conn_property(&self, connection: &str, property: &str, value: &str) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("nmcli_set_conn_property")?;
            s.conn_properties.insert((connection.to_string(), property.to_string()), value.to_string());
            Ok(())
        }

        async fn nmcli_up(&self, _connection: &str) -> Result<(), Error> {
            let s = self.state.lock().unwrap();
            s.check_fail("nmcli_up")
        }

        async fn nmcli_networking_off(&self) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("nmcli_networking_off")?;
            s.networking_off = true;
            Ok(())
        }

        async fn nmcli_set_dns(&self, device_connection: &str, servers: &[String]) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("nmcli_set_dns")?;
            s.dns_by_iface.insert(device_connection.to_string(), servers.to_vec());
            Ok(())
        }

        async fn resolvectl_available(&self) -> bool {
            self.state.lock().unwrap().resolved_available
        }

        async fn resolvectl_dns(&self, iface: &str, servers: &[String]) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("resolvectl_dns")?;
            s.dns_by_iface.insert(iface.to_string(), servers.to_vec());
            Ok(())
        }

        async fn resolvectl_domain(&self, _iface: &str) -> Result<(), Error> {
            let s = self.state.lock().unwrap();
            s.check_fail("resolvectl_domain")
        }

        async fn resolvectl_default_route(&self, _iface: &str) -> Result<(), Error> {
            let s = self.state.lock().unwrap();
            s.check_fail("resolvectl_default_route")
        }

        async fn resolvectl_flush_caches(&self) -> Result<(), Error> {
            let s = self.state.lock().unwrap();
            s.check_fail("resolvectl_flush_caches")
        }

        async fn resolvectl_revert(&self, iface: &str) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("resolvectl_revert")?;
            s.dns_by_iface.remove(iface);
            Ok(())
        }

        async fn ufw_status(&self) -> Result<String, Error> {
            let s = self.state.lock().unwrap();
            Ok(if s.ufw_active { "Status: active".to_string() } else { "Status: inactive".to_string() })
        }

        async fn ufw_disable(&self) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("ufw_disable")?;
            s.ufw_active = false;
            Ok(())
        }

        async fn ufw_enable(&self) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.check_fail("ufw_enable")?;
            s.ufw_active = true;
            Ok(())
        }

        async fn ping(&self, _ip: &str) -> bool {
            !self.state.lock().unwrap().fail_on.contains_key("ping")
        }

        async fn killall(&self, process_name: &str) -> Result<(), Error> {
            let mut s = self.state.lock().unwrap();
            s.killed.push(process_name.to_string());
            Ok(())
        }
    }
}
