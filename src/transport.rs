pub mod udp;

#[cfg(test)] use mockall::automock;
use std::net::SocketAddr;

/// This is an abstraction over a datagram socket, decoupling the protocol engine from actual
///  network I/O (and facilitating mocking it away for testing).
///
/// Implementations must never block: `send_to` is best effort without delivery guarantee, and
///  `try_recv_from` returns `Ok(None)` if no datagram is pending.
#[cfg_attr(test, automock)]
pub trait DatagramTransport {
    fn bind(&mut self, local_port: u16) -> anyhow::Result<()>;

    fn close(&mut self);

    fn send_to(&mut self, to: SocketAddr, packet_buf: &[u8]) -> anyhow::Result<()>;

    /// Reads one pending datagram into `buf`, returning its length and sender. Datagrams that
    ///  do not fit into `buf` may be truncated.
    fn try_recv_from(&mut self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>>;
}

/// The host's view of link-level connectivity (e.g. WiFi association), sampled once per tick
pub trait LinkMonitor {
    fn is_link_up(&self) -> bool;
}

impl<F: Fn() -> bool> LinkMonitor for F {
    fn is_link_up(&self) -> bool {
        self()
    }
}

/// for hosts without a separate notion of link connectivity
pub struct AlwaysUp;
impl LinkMonitor for AlwaysUp {
    fn is_link_up(&self) -> bool {
        true
    }
}
