//! Bulb discovery via SSDP-style UDP search.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::{Result, YeelightError};

/// UDP port the bulbs answer search queries on
const SSDP_PORT: u16 = 1982;

/// Well-known multicast group the bulbs listen on for search queries
const SSDP_GROUP: SocketAddr = SocketAddr::new(
    IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)),
    SSDP_PORT,
);

/// Default TCP port of the command endpoint
pub const COMMAND_PORT: u16 = 55443;

/// Address of one bulb's command endpoint
///
/// Immutable once resolved, either from configuration or from a discovery
/// reply's `Location:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Discover a bulb on the local network via multicast search
///
/// Sends one search query to the well-known multicast group and waits up to
/// `timeout` for any single reply; the first reply wins. A silent network
/// yields [`YeelightError::NotFound`]. No retry is attempted here; callers
/// retry at a higher layer if they want to.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use yeelight_lan::discover;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let addr = discover(Duration::from_secs(3)).await?;
///     println!("bulb found at {}", addr);
///     Ok(())
/// }
/// ```
pub async fn discover(timeout: Duration) -> Result<DeviceAddress> {
    query(SSDP_GROUP, timeout).await
}

/// Direct the search query at one known IP instead of the multicast group
///
/// Same query and same reply handling as [`discover`], but unicast, for
/// setups where multicast does not cross the local segment.
pub async fn discover_at(ip: IpAddr, timeout: Duration) -> Result<DeviceAddress> {
    query(SocketAddr::new(ip, SSDP_PORT), timeout).await
}

async fn query(target: SocketAddr, timeout: Duration) -> Result<DeviceAddress> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;

    let msg = search_message(&target);
    socket.send_to(msg.as_bytes(), target).await?;
    tracing::debug!("Sent search query to {}", target);

    let mut buf = [0u8; 1024];
    match tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await {
        Ok(Ok((size, from))) => {
            let reply = String::from_utf8_lossy(&buf[..size]);
            tracing::debug!("Search reply from {}: {}", from, reply);
            parse_location(&reply)
                .ok_or_else(|| YeelightError::InvalidReply("no Location header".to_string()))
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(YeelightError::NotFound),
    }
}

fn search_message(target: &SocketAddr) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\nHOST: {target}\r\nMAN: \"ssdp:discover\"\r\nST: wifi_bulb\r\n"
    )
}

/// Extract the command endpoint from a search reply
///
/// The reply is free-form text with a line like
/// `Location: yeelight://192.168.1.10:55443`. Bulb firmware is not strictly
/// RFC-compliant, so the scan is lenient about case and extra whitespace.
fn parse_location(reply: &str) -> Option<DeviceAddress> {
    for line in reply.lines() {
        let line = line.trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("location") {
            continue;
        }

        let value = value.trim();
        let endpoint = value.strip_prefix("yeelight://").unwrap_or(value);
        let (ip, port) = match endpoint.rsplit_once(':') {
            Some((ip, port)) => (ip, port.trim().parse().ok()?),
            None => (endpoint, COMMAND_PORT),
        };
        return Some(DeviceAddress::new(ip.trim().parse().ok()?, port));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_location_typical_reply() {
        let reply = "HTTP/1.1 200 OK\r\nCache-Control: max-age=3600\r\nLocation: yeelight://192.168.1.10:55443\r\nid: 0x0000000002dfb19a\r\n";
        let addr = parse_location(reply).unwrap();
        assert_eq!(addr.ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(addr.port, 55443);
    }

    #[test]
    fn parse_location_tolerates_case_and_whitespace() {
        let reply = "HTTP/1.1 200 OK\r\n  LOCATION :   yeelight://10.0.0.7:55443  \r\n";
        let addr = parse_location(reply).unwrap();
        assert_eq!(addr.ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(addr.port, 55443);
    }

    #[test]
    fn parse_location_without_scheme_or_port() {
        let addr = parse_location("Location: 10.0.0.9\r\n").unwrap();
        assert_eq!(addr.ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)));
        assert_eq!(addr.port, COMMAND_PORT);
    }

    #[test]
    fn parse_location_missing_header() {
        assert!(parse_location("HTTP/1.1 200 OK\r\nServer: POSIX\r\n").is_none());
    }

    #[tokio::test]
    async fn query_returns_first_reply() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = responder.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (size, from) = responder.recv_from(&mut buf).await.unwrap();
            let query = String::from_utf8_lossy(&buf[..size]).to_string();
            assert!(query.starts_with("M-SEARCH * HTTP/1.1\r\n"));
            assert!(query.contains("ST: wifi_bulb"));
            responder
                .send_to(
                    b"HTTP/1.1 200 OK\r\nLocation: yeelight://192.168.1.42:55443\r\n",
                    from,
                )
                .await
                .unwrap();
        });

        let addr = query(target, Duration::from_secs(2)).await.unwrap();
        assert_eq!(addr.ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42)));
        assert_eq!(addr.port, 55443);
    }

    #[tokio::test]
    async fn query_times_out_as_not_found() {
        // Nothing listens here; the query must come back within timeout.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = silent.local_addr().unwrap();

        let started = std::time::Instant::now();
        let err = query(target, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, YeelightError::NotFound));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
