use std::net::SocketAddr;
use anyhow::bail;
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, Timestamp};
use crate::config::DeviceConfig;
use crate::handler::DeviceHandler;
use crate::identity::DeviceIdentity;
use crate::protocol::command::{Command, ControlCommand};
use crate::session::connectivity::{Connectivity, ConnectivityEvent};
use crate::session::inbound::InboundDispatcher;
use crate::session::outbound::{OutboundSlot, RetryDecision, RetryPolicy, SendAdmission};
use crate::transport::{DatagramTransport, LinkMonitor};

/// upper bound for the number of datagrams a single tick processes, so that a flood of incoming
///  datagrams cannot keep `tick` from returning
pub const MAX_DATAGRAMS_PER_TICK: usize = 16;

/// Priority flags for a send.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SendOptions {
    /// a blocking message can only be superseded by a forced send
    pub blocking: bool,
    /// replace whatever is in flight, even if it is blocking
    pub force_send: bool,
}
impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            blocking: true,
            force_send: false,
        }
    }
}

/// The device side of the protocol. A `RemoteDevice` is poll-driven and single threaded: the
///  host calls [RemoteDevice::tick] periodically (see [crate::driver::run_device]), and all
///  handler callbacks happen synchronously from inside `tick`, `send` or `on_datagram`.
///
/// There is at most one outbound message in flight. It is retransmitted until the server
///  acknowledges it or a later send supersedes it; see [SendOptions] for the priority rules.
pub struct RemoteDevice<H: DeviceHandler> {
    config: DeviceConfig,
    identity: DeviceIdentity,
    transport: Box<dyn DatagramTransport>,
    link_monitor: Box<dyn LinkMonitor>,
    clock: Box<dyn Clock>,
    handler: H,

    connectivity: Connectivity,
    slot: OutboundSlot,
    dispatcher: InboundDispatcher,
    receive_buf: Vec<u8>,
    last_receive: Timestamp,
    is_started: bool,
}

impl<H: DeviceHandler> RemoteDevice<H> {
    pub fn new(config: DeviceConfig, identity: DeviceIdentity, transport: Box<dyn DatagramTransport>, link_monitor: Box<dyn LinkMonitor>, clock: Box<dyn Clock>, handler: H) -> anyhow::Result<RemoteDevice<H>> {
        config.validate()?;

        let slot = Self::new_slot(&config, &identity);
        if identity.device_type.len() > slot.max_payload_len() {
            bail!("device type '{}' does not fit into a packet of {} bytes", identity.device_type, config.max_packet_size);
        }

        Ok(RemoteDevice {
            connectivity: Self::new_connectivity(&config),
            slot,
            dispatcher: Self::new_dispatcher(&config, &identity),
            // one spare byte to detect datagrams exceeding the maximum packet size
            receive_buf: vec![0; config.max_packet_size + 1],
            last_receive: Timestamp::default(),
            is_started: false,
            config,
            identity,
            transport,
            link_monitor,
            clock,
            handler,
        })
    }

    fn new_connectivity(config: &DeviceConfig) -> Connectivity {
        Connectivity::new(config.broadcast_addr, config.server_port, config.server_id)
    }

    fn new_slot(config: &DeviceConfig, identity: &DeviceIdentity) -> OutboundSlot {
        OutboundSlot::new(identity.device_id, config.max_packet_size, RetryPolicy::from_config(config))
    }

    fn new_dispatcher(config: &DeviceConfig, identity: &DeviceIdentity) -> InboundDispatcher {
        InboundDispatcher::new(identity.clone(), config.max_packet_size, config.msg_id_wraparound_threshold)
    }

    /// Binds the transport, starts a fresh session, and announces the device by sending INIT
    ///  as a blocking message. INIT goes to the broadcast address since the server is not
    ///  known yet.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.is_started {
            bail!("device is started already");
        }

        self.transport.bind(self.config.local_port)?;

        let now = self.clock.now();
        self.connectivity = Self::new_connectivity(&self.config);
        self.slot = Self::new_slot(&self.config, &self.identity);
        self.dispatcher = Self::new_dispatcher(&self.config, &self.identity);
        self.last_receive = now;
        self.is_started = true;

        info!("starting device {:x} ({} v{})", self.identity.device_id, self.identity.device_type, self.identity.device_version);

        let args = [self.identity.device_version, self.config.server_id, 0, 0];
        let admission = self.slot.prepare(ControlCommand::Init.into(), args, self.identity.device_type.as_bytes(), true, true, now)?;
        self.on_admission(admission);
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.is_started {
            return;
        }
        info!("stopping device {:x}", self.identity.device_id);
        self.transport.close();
        self.is_started = false;
    }

    /// Samples the link, processes pending datagrams (up to [MAX_DATAGRAMS_PER_TICK]) and
    ///  evaluates retransmission and keepalive timers. Nothing but the link is evaluated while
    ///  the link is down.
    pub fn tick(&mut self, now: Timestamp) {
        if !self.is_started {
            return;
        }

        trace!("tick @ {:?}", now);

        let is_link_up = self.link_monitor.is_link_up();
        for evt in self.connectivity.on_link_status(is_link_up) {
            self.notify(evt, now);
        }
        if !self.connectivity.is_link_connected() {
            return;
        }

        self.pump(now);
        self.evaluate_timers(now);
    }

    fn pump(&mut self, now: Timestamp) {
        let mut receive_buf = std::mem::take(&mut self.receive_buf);
        for _ in 0..MAX_DATAGRAMS_PER_TICK {
            match self.transport.try_recv_from(&mut receive_buf) {
                Ok(Some((len, from))) => {
                    let len = len.min(receive_buf.len());
                    self.on_datagram(now, from, &receive_buf[..len]);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("stopped receiving for this tick: {}", e);
                    break;
                }
            }
        }
        self.receive_buf = receive_buf;
    }

    fn evaluate_timers(&mut self, now: Timestamp) {
        match self.slot.poll_retry(now, self.connectivity.is_server_connected()) {
            RetryDecision::GiveUp => {
                warn!("message {} was not acknowledged - giving up on the server", self.slot.current_msg_id());
                if let Some(evt) = self.connectivity.on_server_lost() {
                    self.notify(evt, now);
                }
            }
            RetryDecision::Retransmit => {
                debug!("retransmitting message {} (attempt #{})", self.slot.current_msg_id(), self.slot.sent_count());
                self.transmit_slot();
            }
            RetryDecision::Wait => {}
            RetryDecision::Idle => {
                if self.slot.is_keepalive_due(now, self.last_receive) {
                    debug!("nothing received for {}ms - sending keepalive", now.millis_since(self.last_receive));
                    if let Err(e) = self.send_internal(ControlCommand::Ping.into(), [0; 4], &[], false, false, now) {
                        warn!("error sending keepalive: {}", e);
                    }
                }
            }
        }
    }

    /// Entry point for a received datagram. This is called by `tick` for everything the
    ///  transport has pending, but it can be called directly by hosts that receive datagrams
    ///  through other means.
    pub fn on_datagram(&mut self, now: Timestamp, from: SocketAddr, packet: &[u8]) {
        if !self.is_started {
            debug!("device is not started - dropping datagram from {:?}", from);
            return;
        }

        trace!("received {} bytes from {:?}", packet.len(), from);

        if packet.len() > self.config.max_packet_size {
            debug!("datagram of {} bytes from {:?} exceeds the maximum packet size of {} bytes - dropping", packet.len(), from, self.config.max_packet_size);
            return;
        }

        // receiving anything proves there is a link
        for evt in self.connectivity.on_link_status(true) {
            self.notify(evt, now);
        }

        let (header, payload) = match self.dispatcher.parse(packet) {
            Some(parsed) => parsed,
            None => return,
        };

        if let Some(evt) = self.connectivity.on_server_contact(from) {
            self.slot.reset_sent_count();
            self.notify(evt, now);
        }
        self.last_receive = now;

        let server_id = self.connectivity.server_id();
        if let Some(reply) = self.dispatcher.dispatch(&header, payload, server_id, &mut self.slot, &mut self.handler) {
            trace!("replying to message {} from {:?}", header.msg_id, from);
            if let Err(e) = self.transport.send_to(from, reply) {
                warn!("error sending reply to {:?}: {}", from, e);
            }
        }
    }

    /// Sends an application command to the server.
    ///
    /// Returns the new message's id, or `None` if a blocking message is in flight and the send
    ///  was not forced. Fails if the device is not started, if `command` is one of the
    ///  protocol's reserved values, or if the payload does not fit into a packet.
    pub fn send(&mut self, command: u16, args: [u16; 4], payload: &[u8], options: SendOptions) -> anyhow::Result<Option<u16>> {
        if !self.is_started {
            bail!("device is not started");
        }
        let command = match Command::from(command) {
            Command::Control(reserved) => bail!("command {:?} is reserved for the protocol", reserved),
            application => application,
        };

        let now = self.clock.now();
        self.send_internal(command, args, payload, options.blocking, options.force_send, now)
    }

    /// blocking, not forced, no payload
    pub fn send_command(&mut self, command: u16, args: [u16; 4]) -> anyhow::Result<Option<u16>> {
        self.send(command, args, &[], SendOptions::default())
    }

    /// blocking, not forced, with the text's UTF-8 representation as payload
    pub fn send_str(&mut self, command: u16, args: [u16; 4], text: &str) -> anyhow::Result<Option<u16>> {
        self.send(command, args, text.as_bytes(), SendOptions::default())
    }

    fn send_internal(&mut self, command: Command, args: [u16; 4], payload: &[u8], blocking: bool, force_send: bool, now: Timestamp) -> anyhow::Result<Option<u16>> {
        let admission = self.slot.prepare(command, args, payload, blocking, force_send, now)?;
        Ok(self.on_admission(admission))
    }

    fn on_admission(&mut self, admission: SendAdmission) -> Option<u16> {
        match admission {
            SendAdmission::Rejected => None,
            SendAdmission::Accepted { msg_id, superseded } => {
                if let Some(cancelled) = superseded {
                    self.handler.on_packet_cancelled(cancelled);
                }
                self.transmit_slot();
                Some(msg_id)
            }
        }
    }

    fn transmit_slot(&mut self) {
        let to = self.connectivity.server_addr();
        trace!("sending message {} to {:?}", self.slot.current_msg_id(), to);
        if let Err(e) = self.transport.send_to(to, self.slot.packet()) {
            warn!("error sending message {} to {:?}: {}", self.slot.current_msg_id(), to, e);
        }
    }

    fn notify(&mut self, evt: ConnectivityEvent, now: Timestamp) {
        match evt {
            ConnectivityEvent::LinkConnected => self.handler.on_link_connected(now),
            ConnectivityEvent::LinkDisconnected => self.handler.on_link_disconnected(now),
            ConnectivityEvent::ServerConnected => self.handler.on_server_connected(now),
            ConnectivityEvent::ServerDisconnected => self.handler.on_server_disconnected(now),
        }
    }

    /// true if a send without `force_send` would be accepted
    pub fn ready_to_send(&self) -> bool {
        self.slot.ready_to_send()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }

    pub fn is_link_connected(&self) -> bool {
        self.connectivity.is_link_connected()
    }

    pub fn is_server_connected(&self) -> bool {
        self.connectivity.is_server_connected()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.connectivity.server_addr()
    }

    pub fn current_msg_id(&self) -> u16 {
        self.slot.current_msg_id()
    }

    pub fn is_sending(&self) -> bool {
        self.slot.is_sending()
    }

    pub fn last_received_msg_id(&self) -> u16 {
        self.dispatcher.receive_window().last_received_msg_id()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
