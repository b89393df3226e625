//! Operator-facing operations: wake, status and check-and-wake.
//!
//! Each accepts a single host name (case-insensitive) or "all". Batch runs are
//! never fail-fast: every host gets its own outcome.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::net::Ipv4Addr;
use tracing::{info, warn};

use crate::config::Host;
use crate::engine::Monitor;
use crate::error::{CommandError, WakeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Host(String),
}

impl Target {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg.map(str::trim) {
            None | Some("") => Target::All,
            Some(name) if name.eq_ignore_ascii_case("all") => Target::All,
            Some(name) => Target::Host(name.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct WakeReport {
    pub host: String,
    pub mac_address: String,
    pub result: Result<(), WakeError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Up,
    Down,
    NoIp,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
    pub status: HostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
    pub check_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeVerdict {
    Up,
    Down,
    NoIp,
}

#[derive(Debug)]
pub struct CheckWakeReport {
    pub host: String,
    pub verdict: ProbeVerdict,
    /// `None` when the host was up and no packet was sent.
    pub wake: Option<Result<(), WakeError>>,
}

impl Monitor {
    fn select(&self, target: &Target) -> Result<Vec<&Host>, CommandError> {
        match target {
            Target::All => Ok(self.config.servers.iter().collect()),
            Target::Host(name) => self
                .config
                .find_host(name)
                .map(|host| vec![host])
                .ok_or_else(|| CommandError::UnknownHost(name.clone())),
        }
    }

    async fn wake_host(&self, host: &Host) -> Result<(), WakeError> {
        let result = self.sender.wake(&host.mac_address, &self.config.broadcast_ip).await;
        match &result {
            Ok(()) => info!(host = %host.name, mac = %host.mac_address, "Magic packet sent"),
            Err(e) => warn!(host = %host.name, error = %e, "Failed to wake"),
        }
        result
    }

    pub async fn wake(&self, target: &Target) -> Result<Vec<WakeReport>, CommandError> {
        let hosts = self.select(target)?;
        let mut reports = Vec::with_capacity(hosts.len());
        for host in hosts {
            reports.push(WakeReport {
                host: host.name.clone(),
                mac_address: host.mac_address.clone(),
                result: self.wake_host(host).await,
            });
        }
        Ok(reports)
    }

    /// Reads recorded state. A host with an IP but no record yet is checked
    /// live; the result is reported but not recorded.
    pub async fn status(&self, target: &Target) -> Result<Vec<StatusReport>, CommandError> {
        let hosts = self.select(target)?;
        let mut reports = Vec::with_capacity(hosts.len());
        for host in hosts {
            let Some(ip) = host.ip_address else {
                reports.push(StatusReport {
                    host: host.name.clone(),
                    ip: None,
                    status: HostStatus::NoIp,
                    last_checked: None,
                    last_changed: None,
                    check_count: 0,
                });
                continue;
            };

            let report = match self.server_state(&host.name).await {
                Some(state) => StatusReport {
                    host: host.name.clone(),
                    ip: Some(ip),
                    status: if state.is_up { HostStatus::Up } else { HostStatus::Down },
                    last_checked: Some(state.last_checked),
                    last_changed: Some(state.last_changed),
                    check_count: state.check_count,
                },
                None => {
                    let is_up = self.prober.is_reachable(ip, &host.tcp_ports).await;
                    StatusReport {
                        host: host.name.clone(),
                        ip: Some(ip),
                        status: if is_up { HostStatus::Up } else { HostStatus::Down },
                        last_checked: None,
                        last_changed: None,
                        check_count: 0,
                    }
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Probes each selected host live and wakes the ones that are down or have
    /// no IP. Does not touch the monitor's recorded state.
    pub async fn check_and_wake(&self, target: &Target) -> Result<Vec<CheckWakeReport>, CommandError> {
        let hosts = self.select(target)?;
        let reports = join_all(hosts.into_iter().map(|host| async move {
            let verdict = match host.ip_address {
                None => ProbeVerdict::NoIp,
                Some(ip) => {
                    if self.prober.is_reachable(ip, &host.tcp_ports).await {
                        ProbeVerdict::Up
                    } else {
                        ProbeVerdict::Down
                    }
                }
            };
            let wake = match verdict {
                ProbeVerdict::Up => None,
                ProbeVerdict::Down | ProbeVerdict::NoIp => Some(self.wake_host(host).await),
            };
            CheckWakeReport { host: host.name.clone(), verdict, wake }
        }))
        .await;
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{monitor_with, test_config, ScriptedProber, H1, H2};
    use crate::wol::{MagicPacketSender, MAGIC_PACKET_LEN};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    async fn receiver() -> (UdpSocket, MagicPacketSender) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, MagicPacketSender::with_port(port))
    }

    async fn drain(socket: &UdpSocket) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut buf = [0u8; 512];
        while let Ok(Ok((len, _))) =
            tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await
        {
            sizes.push(len);
        }
        sizes
    }

    fn loopback_config() -> crate::config::MonitorConfig {
        let mut config = test_config();
        config.broadcast_ip = "127.0.0.1".into();
        config
    }

    #[test]
    fn target_parsing() {
        assert_eq!(Target::from_arg(None), Target::All);
        assert_eq!(Target::from_arg(Some("ALL")), Target::All);
        assert_eq!(Target::from_arg(Some(" rpi ")), Target::Host("rpi".into()));
    }

    #[tokio::test]
    async fn wake_single_host_sends_one_packet() {
        let (socket, sender) = receiver().await;
        let (monitor, _) = monitor_with(loopback_config(), Arc::new(ScriptedProber::default()), sender);

        let reports = monitor.wake(&Target::Host("H1".into())).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].host, "h1");
        assert!(reports[0].result.is_ok());
        assert_eq!(drain(&socket).await, vec![MAGIC_PACKET_LEN]);
    }

    #[tokio::test]
    async fn wake_all_collects_per_host_errors() {
        let (socket, sender) = receiver().await;
        let mut config = loopback_config();
        config.servers[1].mac_address = "not-a-mac".into();
        let (monitor, _) = monitor_with(config, Arc::new(ScriptedProber::default()), sender);

        let reports = monitor.wake(&Target::All).await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports[0].result.is_ok());
        assert!(matches!(reports[1].result, Err(WakeError::InvalidMac { .. })));
        assert!(reports[2].result.is_ok());
        assert_eq!(drain(&socket).await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_host_is_an_error() {
        let (monitor, _) = monitor_with(test_config(), Arc::new(ScriptedProber::default()), MagicPacketSender::default());
        assert!(matches!(
            monitor.wake(&Target::Host("ghost".into())).await,
            Err(CommandError::UnknownHost(name)) if name == "ghost"
        ));
        assert!(monitor.status(&Target::Host("ghost".into())).await.is_err());
        assert!(monitor.check_and_wake(&Target::Host("ghost".into())).await.is_err());
    }

    #[tokio::test]
    async fn status_reads_recorded_state() {
        let prober = Arc::new(ScriptedProber::default().with(H1, &[true, true]).with(H2, &[false, false]));
        let (monitor, _) = monitor_with(test_config(), prober.clone(), MagicPacketSender::default());

        // Nothing recorded yet: addressed hosts are checked live, never left unresolved.
        let before = monitor.status(&Target::All).await.unwrap();
        let statuses: Vec<_> = before.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![HostStatus::Up, HostStatus::Down, HostStatus::NoIp]);
        assert!(before.iter().all(|r| r.check_count == 0 && r.last_checked.is_none()));
        assert_eq!(prober.calls().len(), 2);
        assert!(monitor.states().await.is_empty());

        monitor.sweep().await;
        let calls_after_sweep = prober.calls().len();

        let reports = monitor.status(&Target::All).await.unwrap();
        let statuses: Vec<_> = reports.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![HostStatus::Up, HostStatus::Down, HostStatus::NoIp]);
        assert_eq!(reports[0].check_count, 1);
        assert_eq!(reports[2].ip, None);
        assert_eq!(prober.calls().len(), calls_after_sweep);

        let single = monitor.status(&Target::Host("NAS".into())).await.unwrap();
        assert_eq!(single[0].status, HostStatus::NoIp);
    }

    #[tokio::test]
    async fn check_and_wake_only_wakes_down_or_unaddressed_hosts() {
        let (socket, sender) = receiver().await;
        let prober = Arc::new(ScriptedProber::default().with(H1, &[true]).with(H2, &[false]));
        let (monitor, _) = monitor_with(loopback_config(), prober, sender);

        let reports = monitor.check_and_wake(&Target::All).await.unwrap();
        assert_eq!(reports.len(), 3);

        assert_eq!(reports[0].verdict, ProbeVerdict::Up);
        assert!(reports[0].wake.is_none());
        assert_eq!(reports[1].verdict, ProbeVerdict::Down);
        assert!(matches!(reports[1].wake, Some(Ok(()))));
        assert_eq!(reports[2].verdict, ProbeVerdict::NoIp);
        assert!(matches!(reports[2].wake, Some(Ok(()))));

        assert_eq!(drain(&socket).await, vec![MAGIC_PACKET_LEN, MAGIC_PACKET_LEN]);
        assert!(monitor.states().await.is_empty());
    }
}
