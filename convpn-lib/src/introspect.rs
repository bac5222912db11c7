//! Parsers over command output and the tunnel's own log, used to observe
//! current host network state without mutating anything.
//!
//! Each extractor is a small, independently testable function rather than
//! one monolithic regex: OpenVPN's log format has drifted across versions,
//! so several fields try more than one pattern, first match wins.

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteEndpoint {
    pub ip: String,
    pub port: String,
    pub proto: String,
}

static TUN_DEVICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"TUN/TAP device (tun\d+) opened").expect("valid regex"));
static PUSHED_DNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:dhcp-option DNS|net_dns_v4_add:)\s+([\d.]+)").expect("valid regex"));
static REMOTE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"link remote:? \[AF_INET\]([\d.]+):(\d+)\s*(?:\((tcp|udp)\))?").expect("valid regex")
});
static DCO_IP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"net_addr_v4_add:\s*([\d.]+)/\d+").expect("valid regex"));
static IFCONFIG_IP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ifconfig\s+([\d.]+)\s+[\d.]+").expect("valid regex"));
static IP_ADDR_ADD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ip addr add dev tun\d+\s+([\d.]+)/\d+").expect("valid regex"));

pub const INIT_SEQUENCE_MARKER: &str = "Initialization Sequence Completed";

pub fn tunnel_is_up(log: &str) -> bool {
    log.contains(INIT_SEQUENCE_MARKER)
}

pub fn tun_interface(log: &str) -> Option<String> {
    TUN_DEVICE_RE.captures(log).map(|c| c[1].to_string())
}

/// Unique pushed DNS servers, preserving first-seen order.
pub fn pushed_dns_servers(log: &str) -> Vec<Ipv4Addr> {
    let mut seen = Vec::new();
    for caps in PUSHED_DNS_RE.captures_iter(log) {
        if let Ok(addr) = caps[1].parse::<Ipv4Addr>() {
            if !seen.contains(&addr) {
                seen.push(addr);
            }
        }
    }
    seen
}

pub fn remote_endpoint(log: &str) -> Option<RemoteEndpoint> {
    let caps = REMOTE_LINE_RE.captures(log)?;
    Some(RemoteEndpoint {
        ip: caps[1].to_string(),
        port: caps[2].to_string(),
        proto: caps.get(3).map(|m| m.as_str()).unwrap_or("udp").to_string(),
    })
}

/// Internal tunnel IP, tried against three known log shapes in order:
/// modern data-channel-offload, classic `ifconfig`, and legacy `ip addr add`.
pub fn internal_ip(log: &str) -> Option<String> {
    DCO_IP_RE
        .captures(log)
        .or_else(|| IFCONFIG_IP_RE.captures(log))
        .or_else(|| IP_ADDR_ADD_RE.captures(log))
        .map(|c| c[1].to_string())
}

pub fn default_route_line(ip_route_output: &str) -> Option<String> {
    ip_route_output
        .lines()
        .find(|line| line.starts_with("default "))
        .map(|line| line.trim_start_matches("default ").to_string())
}

/// Every non-tunnel default route line, used by the guardian to find
/// routes that need correcting.
pub fn non_tunnel_default_routes(ip_route_output: &str) -> Vec<String> {
    ip_route_output
        .lines()
        .filter(|line| line.starts_with("default ") && !line.contains("dev tun"))
        .map(str::to_string)
        .collect()
}

pub fn main_managed_connection(nmcli_device_status: &str) -> Option<(String, String)> {
    // Expected columns: DEVICE TYPE STATE CONNECTION
    nmcli_device_status.lines().find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let device = cols.first()?;
        let state = cols.get(2)?;
        let connection = cols.get(3)?;
        if *device != "lo" && !device.starts_with("tun") && *state == "connected" && *connection != "--" {
            Some((device.to_string(), connection.to_string()))
        } else {
            None
        }
    })
}

pub fn local_subnet(ip_route_output: &str, physical_iface: &str) -> Option<String> {
    ip_route_output.lines().find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let cidr = cols.first()?;
        if cidr.contains('/') && line.contains("scope link") && line.contains(physical_iface) {
            Some(cidr.to_string())
        } else {
            None
        }
    })
}

pub fn resolved_active(resolvectl_status_exit_ok: bool) -> bool {
    resolvectl_status_exit_ok
}

pub fn ufw_active(ufw_status_output: &str) -> bool {
    ufw_status_output.lines().next().map(|l| l.trim() == "Status: active").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LOG: &str = "\
Tue Jan  1 00:00:00 2026 TUN/TAP device tun0 opened
Tue Jan  1 00:00:00 2026 link remote: [AF_INET]203.0.113.9:1194 (udp)
Tue Jan  1 00:00:01 2026 PUSH: Received control message: 'PUSH_REPLY,dhcp-option DNS 10.8.0.1,dhcp-option DNS 10.8.0.2,dhcp-option DNS 10.8.0.1'
Tue Jan  1 00:00:02 2026 net_addr_v4_add: 10.8.0.6/24 dev tun0
Tue Jan  1 00:00:03 2026 Initialization Sequence Completed
";

    #[test]
    fn extracts_tun_interface() {
        assert_eq!(tun_interface(SAMPLE_LOG), Some("tun0".to_string()));
    }

    #[test]
    fn extracts_unique_pushed_dns_in_first_seen_order() {
        let servers: Vec<String> = pushed_dns_servers(SAMPLE_LOG).iter().map(ToString::to_string).collect();
        assert_eq!(servers, vec!["10.8.0.1", "10.8.0.2"]);
    }

    #[test]
    fn extracts_remote_endpoint_with_protocol() {
        let remote = remote_endpoint(SAMPLE_LOG).expect("remote endpoint present");
        assert_eq!(remote.ip, "203.0.113.9");
        assert_eq!(remote.port, "1194");
        assert_eq!(remote.proto, "udp");
    }

    #[test]
    fn extracts_internal_ip_from_dco_pattern() {
        assert_eq!(internal_ip(SAMPLE_LOG), Some("10.8.0.6".to_string()));
    }

    #[test]
    fn detects_init_sequence_marker() {
        assert!(tunnel_is_up(SAMPLE_LOG));
        assert!(!tunnel_is_up("still connecting"));
    }

    #[test]
    fn empty_log_yields_no_pushed_dns() {
        assert!(pushed_dns_servers("nothing here").is_empty());
    }

    #[test]
    fn finds_non_tunnel_default_routes() {
        let table = "default via 192.168.1.1 dev eth0 proto dhcp\ndefault dev tun0 scope link\n";
        let stray = non_tunnel_default_routes(table);
        assert_eq!(stray.len(), 1);
        assert!(stray[0].contains("eth0"));
    }

    #[test]
    fn finds_main_managed_connection_skipping_loopback_and_tunnel() {
        let status = "lo loopback connected lo\neth0 ethernet connected Wired-Conn\ntun0 tun connected tun0\n";
        let (device, connection) = main_managed_connection(status).expect("connection found");
        assert_eq!(device, "eth0");
        assert_eq!(connection, "Wired-Conn");
    }

    #[test]
    fn ufw_active_reads_first_status_line() {
        assert!(ufw_active("Status: active\n"));
        assert!(!ufw_active("Status: inactive\n"));
    }
}
