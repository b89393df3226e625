//! Wake-on-LAN magic packets.
//!
//! A magic packet is 6 bytes of `0xFF` followed by the target MAC repeated
//! 16 times, sent as a single UDP datagram. Delivery is never acknowledged.

use std::fmt;
use std::str::FromStr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::error::WakeError;

pub const WOL_PORT: u16 = 9;
pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn magic_packet(&self) -> [u8; MAGIC_PACKET_LEN] {
        let mut packet = [0xFF; MAGIC_PACKET_LEN];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

impl FromStr for MacAddress {
    type Err = WakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| WakeError::InvalidMac { mac: s.to_string(), reason };

        let digits: Vec<u8> = s
            .trim()
            .bytes()
            .filter(|b| *b != b':' && *b != b'-')
            .collect();

        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(invalid("non-hex character"));
        }
        if digits.len() % 2 != 0 {
            return Err(invalid("odd number of hex digits"));
        }
        if digits.len() != 12 {
            return Err(invalid("MAC address must be 6 bytes long"));
        }

        let mut octets = [0u8; 6];
        for (octet, pair) in octets.iter_mut().zip(digits.chunks_exact(2)) {
            let text = std::str::from_utf8(pair).map_err(|_| invalid("non-hex character"))?;
            *octet = u8::from_str_radix(text, 16).map_err(|_| invalid("non-hex character"))?;
        }
        Ok(MacAddress(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

#[derive(Debug, Clone)]
pub struct MagicPacketSender {
    port: u16,
}

impl Default for MagicPacketSender {
    fn default() -> Self {
        Self { port: WOL_PORT }
    }
}

impl MagicPacketSender {
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }

    /// Sends one magic packet for `mac` to `broadcast:port`.
    ///
    /// The MAC is validated before any socket is touched. The socket lives only
    /// for the duration of the call.
    pub async fn wake(&self, mac: &str, broadcast: &str) -> Result<(), WakeError> {
        let mac: MacAddress = mac.parse()?;
        let packet = mac.magic_packet();
        debug!(mac = %mac, broadcast, port = self.port, "Sending magic packet");

        let target = lookup_host((broadcast, self.port))
            .await
            .map_err(WakeError::network("failed to resolve UDP address"))?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| WakeError::Network {
                context: "failed to resolve UDP address",
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no IPv4 address for '{}'", broadcast),
                ),
            })?;

        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(WakeError::network("failed to open UDP socket"))?;
        socket
            .set_broadcast(true)
            .map_err(WakeError::network("failed to enable broadcast"))?;
        socket
            .send_to(&packet, target)
            .await
            .map_err(WakeError::network("failed to send magic packet"))?;

        Ok(())
    }
}
