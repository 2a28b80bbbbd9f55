use std::net::{IpAddr, SocketAddr};
use tracing::info;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectivityEvent {
    LinkConnected,
    LinkDisconnected,
    ServerConnected,
    ServerDisconnected,
}

/// Tracks two independent connected / disconnected state machines: link-level connectivity
///  (is there a network at all?) and the server session (is the server answering?). Every
///  method returns the transitions it caused, so callers can notify the application exactly
///  once per edge.
///
/// The server's address is not pinned: it is taken from whichever peer sends the first valid
///  packet after the session was lost, and it falls back to the broadcast address while there
///  is no session. The server port on the other hand is configured.
///
/// NB: 'server connected' implies 'link connected' - losing the link forces the server session
///      down, and the server session is only established from received packets.
#[derive(Debug)]
pub struct Connectivity {
    link_connected: bool,
    server_connected: bool,
    server_ip: IpAddr,
    server_port: u16,
    server_id: u16,
    broadcast_ip: IpAddr,
}
impl Connectivity {
    pub fn new(broadcast_ip: IpAddr, server_port: u16, server_id: u16) -> Connectivity {
        Connectivity {
            link_connected: false,
            server_connected: false,
            server_ip: broadcast_ip,
            server_port,
            server_id,
            broadcast_ip,
        }
    }

    pub fn is_link_connected(&self) -> bool {
        self.link_connected
    }

    pub fn is_server_connected(&self) -> bool {
        self.server_connected
    }

    /// where outbound messages go: the server if it is known, broadcast otherwise
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }

    pub fn server_id(&self) -> u16 {
        self.server_id
    }

    pub fn on_link_status(&mut self, is_link_up: bool) -> Vec<ConnectivityEvent> {
        let mut result = Vec::new();
        match (self.link_connected, is_link_up) {
            (false, true) => {
                info!("link connected");
                self.link_connected = true;
                result.push(ConnectivityEvent::LinkConnected);
            }
            (true, false) => {
                result.extend(self.on_server_lost());
                info!("link disconnected");
                self.link_connected = false;
                result.push(ConnectivityEvent::LinkDisconnected);
            }
            _ => {}
        }
        result
    }

    /// A valid packet arrived from `from`. If there was no server session, this establishes one
    ///  with `from` as the server.
    pub fn on_server_contact(&mut self, from: SocketAddr) -> Option<ConnectivityEvent> {
        if self.server_connected {
            return None;
        }

        info!("server connected at {:?}", from.ip());
        self.server_connected = true;
        self.server_ip = from.ip();
        Some(ConnectivityEvent::ServerConnected)
    }

    pub fn on_server_lost(&mut self) -> Option<ConnectivityEvent> {
        if !self.server_connected {
            return None;
        }

        info!("server disconnected - falling back to broadcast");
        self.server_connected = false;
        self.server_ip = self.broadcast_ip;
        Some(ConnectivityEvent::ServerDisconnected)
    }
}
