use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use surge_ping::{Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, ICMP};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub const ICMP_TIMEOUT: Duration = Duration::from_secs(2);
pub const TCP_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_TCP_PORTS: &[u16] = &[22, 80, 443];

const ICMP_PAYLOAD: &[u8] = b"wakewatch";

/// Result of a single probe tier.
///
/// `PermissionDenied` means no ICMP socket could be opened at all: surge-ping
/// asks for a raw socket and, when that is refused, silently retries with an
/// unprivileged datagram socket, so an unprivileged process still gets an ICMP
/// tier wherever `net.ipv4.ping_group_range` allows it. `TimedOut` covers no
/// reply within the deadline as well as refused connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOutcome {
    Succeeded,
    PermissionDenied,
    TimedOut,
}

impl TierOutcome {
    pub fn is_success(self) -> bool {
        self == TierOutcome::Succeeded
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn is_reachable(&self, ip: Ipv4Addr, tcp_ports: &[u16]) -> bool;
}

#[derive(Debug, Clone)]
pub struct LivenessProbe {
    icmp_enabled: bool,
    icmp_timeout: Duration,
    tcp_timeout: Duration,
}

impl Default for LivenessProbe {
    fn default() -> Self {
        Self {
            icmp_enabled: true,
            icmp_timeout: ICMP_TIMEOUT,
            tcp_timeout: TCP_TIMEOUT,
        }
    }
}

impl LivenessProbe {
    /// A probe that skips the ICMP tier entirely.
    pub fn tcp_only() -> Self {
        Self { icmp_enabled: false, ..Self::default() }
    }

    pub async fn icmp_tier(&self, ip: Ipv4Addr) -> TierOutcome {
        if !self.icmp_enabled {
            return TierOutcome::PermissionDenied;
        }
        icmp_echo(ip, self.icmp_timeout).await
    }

    pub async fn tcp_tier(&self, ip: Ipv4Addr, tcp_ports: &[u16]) -> TierOutcome {
        tcp_connect_any(ip, effective_ports(tcp_ports), self.tcp_timeout).await
    }
}

#[async_trait]
impl Prober for LivenessProbe {
    async fn is_reachable(&self, ip: Ipv4Addr, tcp_ports: &[u16]) -> bool {
        let icmp = self.icmp_tier(ip).await;
        if icmp.is_success() {
            return true;
        }
        let tcp = self.tcp_tier(ip, tcp_ports).await;
        debug!(%ip, ?icmp, ?tcp, "Probe tiers exhausted");
        tcp.is_success()
    }
}

pub fn effective_ports(tcp_ports: &[u16]) -> &[u16] {
    if tcp_ports.is_empty() {
        DEFAULT_TCP_PORTS
    } else {
        tcp_ports
    }
}

/// Sends one ICMP echo request and waits for the reply. The socket is raw when
/// the process may open one, otherwise surge-ping's datagram fallback.
pub async fn icmp_echo(ip: Ipv4Addr, wait: Duration) -> TierOutcome {
    let config = PingConfig::builder()
        .kind(ICMP::V4)
        .sock_type_hint(socket2::Type::RAW)
        .build();

    let client = match PingClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            if e.kind() != ErrorKind::PermissionDenied {
                debug!(%ip, error = %e, "ICMP socket unavailable");
            }
            return TierOutcome::PermissionDenied;
        }
    };

    let mut pinger = client.pinger(IpAddr::V4(ip), PingIdentifier(rand::random())).await;
    pinger.timeout(wait);

    match pinger.ping(PingSequence(0), ICMP_PAYLOAD).await {
        Ok(_) => TierOutcome::Succeeded,
        Err(e) => {
            debug!(%ip, error = %e, "ICMP echo failed");
            TierOutcome::TimedOut
        }
    }
}

/// Tries each port in order; the first accepted connection is closed at once.
pub async fn tcp_connect_any(ip: Ipv4Addr, ports: &[u16], per_port: Duration) -> TierOutcome {
    for &port in ports {
        match timeout(per_port, TcpStream::connect((ip, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                return TierOutcome::Succeeded;
            }
            Ok(Err(e)) => debug!(%ip, port, error = %e, "TCP connect refused"),
            Err(_) => debug!(%ip, port, "TCP connect timed out"),
        }
    }
    TierOutcome::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn default_ports_when_none_configured() {
        assert_eq!(effective_ports(&[]), &[22, 80, 443]);
        assert_eq!(effective_ports(&[8080]), &[8080]);
    }

    #[tokio::test]
    async fn tcp_tier_accepts_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let outcome = tcp_connect_any(Ipv4Addr::LOCALHOST, &[closed, open], TCP_TIMEOUT).await;
        assert_eq!(outcome, TierOutcome::Succeeded);
    }

    #[tokio::test]
    async fn tcp_tier_fails_on_closed_ports() {
        let closed = closed_port().await;
        let outcome = tcp_connect_any(Ipv4Addr::LOCALHOST, &[closed], TCP_TIMEOUT).await;
        assert_eq!(outcome, TierOutcome::TimedOut);
    }

    #[tokio::test]
    async fn disabled_icmp_reports_permission_denied() {
        let probe = LivenessProbe::tcp_only();
        assert_eq!(probe.icmp_tier(Ipv4Addr::LOCALHOST).await, TierOutcome::PermissionDenied);
    }

    #[tokio::test]
    async fn reachable_via_tcp_without_icmp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(LivenessProbe::tcp_only().is_reachable(Ipv4Addr::LOCALHOST, &[port]).await);
        // Whether or not raw sockets are permitted here, the TCP tier carries the result.
        assert!(LivenessProbe::default().is_reachable(Ipv4Addr::LOCALHOST, &[port]).await);
    }

    #[tokio::test]
    async fn unreachable_when_both_tiers_fail() {
        let closed = closed_port().await;
        assert!(!LivenessProbe::tcp_only().is_reachable(Ipv4Addr::LOCALHOST, &[closed]).await);
    }
}
