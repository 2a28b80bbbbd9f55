use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use anyhow::anyhow;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{error, info, trace};

use crate::transport::DatagramTransport;

/// [DatagramTransport] on a non-blocking IPv4 UDP socket. Broadcast is enabled since the
///  server is discovered by broadcasting until it replies.
#[derive(Default)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
}
impl UdpTransport {
    pub fn new() -> UdpTransport {
        UdpTransport { socket: None }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    fn create_socket(local_port: u16) -> anyhow::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port)).into())?;
        Ok(socket.into())
    }
}

impl DatagramTransport for UdpTransport {
    fn bind(&mut self, local_port: u16) -> anyhow::Result<()> {
        let socket = Self::create_socket(local_port)?;
        info!("bound UDP socket to {:?}", socket.local_addr()?);
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            info!("closing UDP socket {:?}", socket.local_addr().ok());
        }
    }

    fn send_to(&mut self, to: SocketAddr, packet_buf: &[u8]) -> anyhow::Result<()> {
        let socket = self.socket.as_ref()
            .ok_or_else(|| anyhow!("UDP socket is not bound"))?;

        trace!("UDP socket: sending {} bytes to {:?}", packet_buf.len(), to);
        socket.send_to(packet_buf, to)?;
        Ok(())
    }

    fn try_recv_from(&mut self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>> {
        let socket = match &self.socket {
            Some(socket) => socket,
            None => return Ok(None),
        };

        match socket.recv_from(buf) {
            Ok((len, from)) => {
                trace!("UDP socket: received {} bytes from {:?}", len, from);
                Ok(Some((len, from)))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => {
                error!("error receiving UDP packet: {}", e);
                Err(e.into())
            }
        }
    }
}
