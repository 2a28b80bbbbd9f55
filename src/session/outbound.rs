use anyhow::bail;
use tracing::{debug, trace};

use crate::clock::{duration_to_millis, Timestamp};
use crate::config::DeviceConfig;
use crate::protocol::command::{Command, ControlCommand};
use crate::protocol::packet_buffer::PacketBuffer;
use crate::protocol::packet_header::PacketHeader;
use crate::protocol::sequence::MsgIdGenerator;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SendAdmission {
    /// the slot is occupied by a blocking message, and the send was not forced
    Rejected,
    Accepted {
        msg_id: u16,
        /// the id of an application message that was still unacknowledged and is now replaced.
        ///  Keepalives are replaced silently.
        superseded: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDecision {
    /// nothing in flight
    Idle,
    /// in flight, but the retransmission interval has not elapsed yet
    Wait,
    /// the buffered packet is due for retransmission - bookkeeping was updated already
    Retransmit,
    /// the attempt budget is exhausted while the server was considered connected
    GiveUp,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AckOutcome {
    /// the ack does not match the message in flight
    Ignored,
    /// the message in flight was a keepalive
    KeepaliveAcknowledged,
    Delivered { msg_id: u16 },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub connected_interval_millis: u32,
    pub disconnected_interval_millis: u32,
    pub connected_send_count: u8,
    pub max_idle_millis: u32,
}
impl RetryPolicy {
    pub fn from_config(config: &DeviceConfig) -> RetryPolicy {
        RetryPolicy {
            connected_interval_millis: duration_to_millis(config.connected_send_interval),
            disconnected_interval_millis: duration_to_millis(config.disconnected_send_interval),
            connected_send_count: config.connected_send_count,
            max_idle_millis: duration_to_millis(config.max_idle_time),
        }
    }
}

/// The single outbound slot: there is at most one message in flight at any time. The slot keeps
///  the encoded packet so that retransmissions re-send it byte for byte, with the same message
///  id.
///
/// A message stays in the slot until it is acknowledged or superseded by a later send. Giving up
///  on a message (see [RetryDecision::GiveUp]) does *not* clear the slot: it keeps being
///  retransmitted at the slower disconnected cadence, which doubles as rediscovery of the server.
pub struct OutboundSlot {
    device_id: u64,
    msg_ids: MsgIdGenerator,
    buffer: PacketBuffer,
    command: Command,
    sent_count: u8,
    is_sending: bool,
    is_blocking: bool,
    last_sent: Timestamp,
    policy: RetryPolicy,
}
impl OutboundSlot {
    pub fn new(device_id: u64, max_packet_size: usize, policy: RetryPolicy) -> OutboundSlot {
        OutboundSlot {
            device_id,
            msg_ids: MsgIdGenerator::new(),
            buffer: PacketBuffer::new(max_packet_size),
            command: Command::Application(0),
            sent_count: 0,
            is_sending: false,
            is_blocking: false,
            last_sent: Timestamp::default(),
            policy,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    pub fn is_blocking(&self) -> bool {
        self.is_blocking
    }

    pub fn current_msg_id(&self) -> u16 {
        self.msg_ids.current()
    }

    pub fn sent_count(&self) -> u8 {
        self.sent_count
    }

    pub fn max_payload_len(&self) -> usize {
        self.buffer.max_payload_len()
    }

    /// the encoded packet currently in the slot
    pub fn packet(&self) -> &[u8] {
        self.buffer.as_ref()
    }

    /// true if a send without `force_send` would be accepted
    pub fn ready_to_send(&self) -> bool {
        !(self.is_sending && self.is_blocking)
    }

    fn is_keepalive(&self) -> bool {
        self.command == Command::Control(ControlCommand::Ping)
    }

    /// Places a new message into the slot, replacing the previous occupant if priorities allow
    ///  it. The caller is responsible for the first transmission of [OutboundSlot::packet].
    pub fn prepare(&mut self, command: Command, args: [u16; 4], payload: &[u8], blocking: bool, force_send: bool, now: Timestamp) -> anyhow::Result<SendAdmission> {
        if payload.len() > self.max_payload_len() {
            bail!("payload of {} bytes exceeds the maximum of {} bytes per packet", payload.len(), self.max_payload_len());
        }

        if self.is_sending && self.is_blocking && !force_send {
            debug!("message {} is blocking - rejecting send of command {:?}", self.current_msg_id(), command);
            return Ok(SendAdmission::Rejected);
        }

        let superseded = if self.is_sending && !self.is_keepalive() {
            debug!("message {} is superseded by a new send before it was acknowledged", self.current_msg_id());
            Some(self.current_msg_id())
        }
        else {
            None
        };

        let msg_id = self.msg_ids.next_id();
        self.buffer.encode(&PacketHeader::new(self.device_id, msg_id, command.into(), args), payload)?;

        self.command = command;
        self.is_sending = true;
        self.is_blocking = blocking;
        self.sent_count = 1;
        self.last_sent = now;

        trace!("prepared message {} with command {:?}", msg_id, command);
        Ok(SendAdmission::Accepted { msg_id, superseded })
    }

    pub fn poll_retry(&mut self, now: Timestamp, server_connected: bool) -> RetryDecision {
        if !self.is_sending {
            return RetryDecision::Idle;
        }

        let elapsed = now.millis_since(self.last_sent);
        let interval = if server_connected {
            self.policy.connected_interval_millis
        }
        else {
            self.policy.disconnected_interval_millis
        };

        if elapsed <= interval {
            return RetryDecision::Wait;
        }

        if server_connected && self.sent_count >= self.policy.connected_send_count {
            debug!("message {} was sent {} times without acknowledgement", self.current_msg_id(), self.sent_count);
            return RetryDecision::GiveUp;
        }

        self.sent_count = self.sent_count.saturating_add(1);
        self.last_sent = now;
        RetryDecision::Retransmit
    }

    /// true if the device is idle and has not heard from the server for too long
    pub fn is_keepalive_due(&self, now: Timestamp, last_receive: Timestamp) -> bool {
        !self.is_sending && now.millis_since(last_receive) >= self.policy.max_idle_millis
    }

    pub fn on_ack(&mut self, msg_id: u16) -> AckOutcome {
        if !self.is_sending || msg_id != self.current_msg_id() {
            debug!("ignoring ack for message {} (current: {}, sending: {})", msg_id, self.current_msg_id(), self.is_sending);
            return AckOutcome::Ignored;
        }

        self.is_sending = false;
        self.sent_count = 0;

        if self.is_keepalive() {
            AckOutcome::KeepaliveAcknowledged
        }
        else {
            AckOutcome::Delivered { msg_id }
        }
    }

    /// INITACK retires whatever is in flight, without matching message ids
    pub fn complete_handshake(&mut self) {
        self.is_sending = false;
        self.sent_count = 0;
    }

    /// a new server session gets a fresh attempt budget for the message in flight
    pub fn reset_sent_count(&mut self) {
        self.sent_count = 0;
    }
}
