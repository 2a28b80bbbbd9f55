//! In-memory collaborators for driving a [crate::device::RemoteDevice] deterministically:
//!  datagrams are queued and recorded instead of going over the network, time and link state
//!  are set explicitly.
//!
//! The collaborators are handles on shared state, so a test can keep a clone after moving the
//!  collaborator itself into the device.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use anyhow::bail;

use crate::clock::{Clock, Timestamp};
use crate::handler::DeviceHandler;
use crate::protocol::packet_buffer::PacketBuffer;
use crate::protocol::packet_header::{decode_packet, PacketHeader};
use crate::transport::{DatagramTransport, LinkMonitor};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SentDatagram {
    pub to: SocketAddr,
    pub packet: Vec<u8>,
}
impl SentDatagram {
    pub fn header(&self) -> PacketHeader {
        decode_packet(&self.packet).expect("sent packet should be well-formed").0
    }

    pub fn payload(&self) -> &[u8] {
        &self.packet[PacketHeader::SERIALIZED_LEN..]
    }
}

#[derive(Default)]
struct TransportState {
    bound_port: Option<u16>,
    sent: Vec<SentDatagram>,
    inbox: VecDeque<(SocketAddr, Vec<u8>)>,
}

#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Rc<RefCell<TransportState>>,
}
impl RecordingTransport {
    pub fn new() -> RecordingTransport {
        Default::default()
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.state.borrow().bound_port
    }

    /// queues a datagram to be returned by the next `try_recv_from`
    pub fn push_datagram(&self, from: SocketAddr, packet: &[u8]) {
        self.state.borrow_mut().inbox.push_back((from, packet.to_vec()));
    }

    pub fn num_pending(&self) -> usize {
        self.state.borrow().inbox.len()
    }

    pub fn take_sent(&self) -> Vec<SentDatagram> {
        std::mem::take(&mut self.state.borrow_mut().sent)
    }
}

impl DatagramTransport for RecordingTransport {
    fn bind(&mut self, local_port: u16) -> anyhow::Result<()> {
        self.state.borrow_mut().bound_port = Some(local_port);
        Ok(())
    }

    fn close(&mut self) {
        self.state.borrow_mut().bound_port = None;
    }

    fn send_to(&mut self, to: SocketAddr, packet_buf: &[u8]) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.bound_port.is_none() {
            bail!("transport is not bound");
        }
        state.sent.push(SentDatagram { to, packet: packet_buf.to_vec() });
        Ok(())
    }

    fn try_recv_from(&mut self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>> {
        let mut state = self.state.borrow_mut();
        if state.bound_port.is_none() {
            return Ok(None);
        }
        match state.inbox.pop_front() {
            Some((from, packet)) => {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                Ok(Some((len, from)))
            }
            None => Ok(None),
        }
    }
}

#[derive(Clone, Default)]
pub struct ManualClock {
    millis: Rc<Cell<u32>>,
}
impl ManualClock {
    pub fn new(millis: u32) -> ManualClock {
        ManualClock { millis: Rc::new(Cell::new(millis)) }
    }

    pub fn set(&self, millis: u32) {
        self.millis.set(millis);
    }
}
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.get())
    }
}

/// link monitor that is up initially
#[derive(Clone)]
pub struct SwitchableLink {
    is_up: Rc<Cell<bool>>,
}
impl SwitchableLink {
    pub fn new() -> SwitchableLink {
        SwitchableLink { is_up: Rc::new(Cell::new(true)) }
    }

    pub fn set_up(&self, is_up: bool) {
        self.is_up.set(is_up);
    }
}
impl Default for SwitchableLink {
    fn default() -> Self {
        Self::new()
    }
}
impl LinkMonitor for SwitchableLink {
    fn is_link_up(&self) -> bool {
        self.is_up.get()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum HandlerEvent {
    LinkConnected,
    LinkDisconnected,
    ServerConnected,
    ServerDisconnected,
    Delivered { msg_id: u16, response: u16 },
    Cancelled { msg_id: u16 },
    Command { command: u16, args: [u16; 4], payload: Vec<u8> },
}

/// records every callback, answering all application commands with `response`
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Vec<HandlerEvent>,
    pub response: u16,
}
impl RecordingHandler {
    pub fn new(response: u16) -> RecordingHandler {
        RecordingHandler {
            events: Vec::new(),
            response,
        }
    }

    pub fn take_events(&mut self) -> Vec<HandlerEvent> {
        std::mem::take(&mut self.events)
    }
}
impl DeviceHandler for RecordingHandler {
    fn on_link_connected(&mut self, _now: Timestamp) {
        self.events.push(HandlerEvent::LinkConnected);
    }

    fn on_link_disconnected(&mut self, _now: Timestamp) {
        self.events.push(HandlerEvent::LinkDisconnected);
    }

    fn on_server_connected(&mut self, _now: Timestamp) {
        self.events.push(HandlerEvent::ServerConnected);
    }

    fn on_server_disconnected(&mut self, _now: Timestamp) {
        self.events.push(HandlerEvent::ServerDisconnected);
    }

    fn on_packet_delivered(&mut self, msg_id: u16, response: u16) {
        self.events.push(HandlerEvent::Delivered { msg_id, response });
    }

    fn on_packet_cancelled(&mut self, msg_id: u16) {
        self.events.push(HandlerEvent::Cancelled { msg_id });
    }

    fn on_command(&mut self, command: u16, args: [u16; 4], payload: &[u8]) -> u16 {
        self.events.push(HandlerEvent::Command { command, args, payload: payload.to_vec() });
        self.response
    }
}

/// encodes a packet the way the server would send it
pub fn server_packet(device_id: u64, msg_id: u16, command: impl Into<u16>, args: [u16; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = PacketBuffer::new(PacketHeader::SERIALIZED_LEN + payload.len());
    buf.encode(&PacketHeader::new(device_id, msg_id, command.into(), args), payload)
        .expect("buffer is sized for the packet");
    buf.as_ref().to_vec()
}
