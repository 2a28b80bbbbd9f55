use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use anyhow::bail;

use crate::protocol::packet_header::PacketHeader;

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub local_port: u16,
    pub server_port: u16,
    /// sent to the server as part of the handshake, 0 if the device does not care which server
    ///  it talks to
    pub server_id: u16,

    /// This is where packets go while no server session is established - the server's address
    ///  is discovered from the first packet it sends back.
    pub broadcast_addr: IpAddr,

    /// The largest datagram the device sends or accepts, including the 20 byte header. Buffers
    ///  of this size are allocated once; send requests with payloads that do not fit are
    ///  rejected.
    pub max_packet_size: usize,

    /// retransmission interval for unacknowledged messages while the server is reachable
    pub connected_send_interval: Duration,
    /// retransmission interval while no server session is established
    pub disconnected_send_interval: Duration,
    /// number of transmissions of a message without acknowledgement after which the server
    ///  is considered unreachable
    pub connected_send_count: u8,
    /// a keepalive is sent if nothing was received for this long while the device is idle
    pub max_idle_time: Duration,

    /// An incoming message id that is lower than the last accepted id by more than this is
    ///  treated as the successor of a wrapped-around id
    pub msg_id_wraparound_threshold: u16,
}

impl DeviceConfig {
    pub fn new(local_port: u16, server_port: u16) -> DeviceConfig {
        DeviceConfig {
            local_port,
            server_port,
            server_id: 0,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            max_packet_size: 512,
            connected_send_interval: Duration::from_millis(1000),
            disconnected_send_interval: Duration::from_millis(10000),
            connected_send_count: 5,
            max_idle_time: Duration::from_millis(5000),
            msg_id_wraparound_threshold: 30000,
        }
    }

    pub fn with_server_id(mut self, server_id: u16) -> DeviceConfig {
        self.server_id = server_id;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_packet_size < PacketHeader::SERIALIZED_LEN {
            bail!("maximum packet size {} is smaller than the packet header ({} bytes)", self.max_packet_size, PacketHeader::SERIALIZED_LEN);
        }
        if self.max_packet_size > u16::MAX as usize {
            bail!("maximum packet size {} exceeds the maximum UDP payload", self.max_packet_size);
        }
        if self.connected_send_interval.is_zero() || self.disconnected_send_interval.is_zero() {
            bail!("send intervals must be positive");
        }
        if self.max_idle_time.is_zero() {
            bail!("maximum idle time must be positive");
        }
        if self.connected_send_count == 0 {
            bail!("connected send count must be positive");
        }
        if self.msg_id_wraparound_threshold == 0 {
            bail!("message id wrap-around threshold must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DeviceConfig::new(5000, 5001).with_server_id(3);
        assert!(config.validate().is_ok());
        assert_eq!(config.server_id, 3);
        assert_eq!(config.broadcast_addr, IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255)));
    }

    #[rstest]
    #[case::packet_too_small(|c: &mut DeviceConfig| c.max_packet_size = 19)]
    #[case::packet_too_big(|c: &mut DeviceConfig| c.max_packet_size = 70000)]
    #[case::connected_interval(|c: &mut DeviceConfig| c.connected_send_interval = Duration::ZERO)]
    #[case::disconnected_interval(|c: &mut DeviceConfig| c.disconnected_send_interval = Duration::ZERO)]
    #[case::idle_time(|c: &mut DeviceConfig| c.max_idle_time = Duration::ZERO)]
    #[case::send_count(|c: &mut DeviceConfig| c.connected_send_count = 0)]
    #[case::threshold(|c: &mut DeviceConfig| c.msg_id_wraparound_threshold = 0)]
    fn test_validate_rejects(#[case] modify: fn(&mut DeviceConfig)) {
        let mut config = DeviceConfig::new(5000, 5001);
        modify(&mut config);
        assert!(config.validate().is_err());
    }
}
