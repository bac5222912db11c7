//! Public-IP verification and port-forwarding lookup performed after the
//! tunnel reports itself up, to confirm traffic is actually routed through it.

use std::time::Duration;

use convpn_lib::session::ForwardedPort;

use crate::error::Error;

const PUBLIC_IP_ENDPOINTS: &[&str] = &["https://ifconfig.me/ip", "https://icanhazip.com", "https://ipinfo.io/ip"];
const PORT_API: &str = "https://connect.pvdatanet.com/v3/Api/port?ip[]=";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn client() -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::General(e.to_string()))
}

/// Queries public-IP endpoints in order, returning the first that answers.
/// A single flaky endpoint should never block a connection check.
pub async fn public_ip() -> Result<String, Error> {
    let client = client()?;
    let mut last_err = None;
    for endpoint in PUBLIC_IP_ENDPOINTS {
        match client.get(*endpoint).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => {
                    let ip = body.trim().to_string();
                    if !ip.is_empty() {
                        return Ok(ip);
                    }
                }
                Err(e) => last_err = Some(e.to_string()),
            },
            Err(e) => last_err = Some(e.to_string()),
        }
    }
    Err(Error::General(format!(
        "all public-IP endpoints failed: {}",
        last_err.unwrap_or_else(|| "unknown error".to_string())
    )))
}

/// Confirms the observed public IP changed from the pre-connect baseline.
pub fn assert_ip_changed(original: &str, observed: &str) -> Result<(), Error> {
    if original == observed {
        return Err(Error::PublicIpUnchanged);
    }
    Ok(())
}

/// Looks up whether the provider is forwarding a port to `internal_ip`.
/// Returns `Unavailable` rather than an error on network failure, since
/// port-forward status is informational, not connection-blocking.
pub async fn forwarded_port(internal_ip: &str) -> ForwardedPort {
    let client = match client() {
        Ok(c) => c,
        Err(_) => return ForwardedPort::Unavailable,
    };
    let url = format!("{PORT_API}{internal_ip}");
    match client.get(&url).send().await {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(body) => parse_port_response(&body),
            Err(_) => ForwardedPort::Unavailable,
        },
        Err(_) => ForwardedPort::Unavailable,
    }
}

/// Parses the provider's `{supported: bool, status: string}` response. The
/// numeric port, when present, lives inside `status` as free text.
fn parse_port_response(body: &serde_json::Value) -> ForwardedPort {
    let supported = body.get("supported").and_then(|v| v.as_bool()).unwrap_or(false);
    if !supported {
        return ForwardedPort::Unsupported;
    }
    let status = body.get("status").and_then(|v| v.as_str()).unwrap_or("");
    let digits: String = status.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() { ForwardedPort::Unavailable } else { ForwardedPort::Known(digits) }
}
