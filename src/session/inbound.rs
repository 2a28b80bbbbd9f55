use tracing::{debug, info, trace, warn};

use crate::handler::DeviceHandler;
use crate::identity::DeviceIdentity;
use crate::protocol::command::{Command, ControlCommand};
use crate::protocol::packet_buffer::PacketBuffer;
use crate::protocol::packet_header::{decode_packet, PacketHeader};
use crate::protocol::sequence::{Acceptance, ReceiveWindow};
use crate::session::outbound::{AckOutcome, OutboundSlot};

/// Routes received packets to handshake, keepalive, acknowledgement or application command
///  handling.
///
/// Replies (INITACK, MSGACK) are encoded into a separate reply buffer. They are unsequenced and
///  sent exactly once: they never occupy the outbound slot, and a lost reply is recovered by the
///  server retransmitting its message, which then hits the receive window's cached response.
pub struct InboundDispatcher {
    identity: DeviceIdentity,
    receive_window: ReceiveWindow,
    reply_buffer: PacketBuffer,
}
impl InboundDispatcher {
    pub fn new(identity: DeviceIdentity, max_packet_size: usize, wraparound_threshold: u16) -> InboundDispatcher {
        InboundDispatcher {
            identity,
            receive_window: ReceiveWindow::new(wraparound_threshold),
            reply_buffer: PacketBuffer::new(max_packet_size),
        }
    }

    pub fn receive_window(&self) -> &ReceiveWindow {
        &self.receive_window
    }

    /// Parses a datagram, returning `None` for anything that is not a packet for this device.
    ///  Those are dropped without any reaction.
    pub fn parse<'a>(&self, packet: &'a [u8]) -> Option<(PacketHeader, &'a [u8])> {
        let (header, payload) = match decode_packet(packet) {
            Ok(decoded) => decoded,
            Err(_) => {
                debug!("packet too small ({} bytes) - dropping", packet.len());
                return None;
            }
        };

        if header.device_id != self.identity.device_id {
            debug!("packet for device {:x}, this is {:x} - dropping", header.device_id, self.identity.device_id);
            return None;
        }
        Some((header, payload))
    }

    /// Handles a packet that passed [InboundDispatcher::parse]. Returns the encoded reply if one
    ///  should be sent back to the packet's sender.
    pub fn dispatch<H: DeviceHandler + ?Sized>(&mut self, header: &PacketHeader, payload: &[u8], server_id: u16, slot: &mut OutboundSlot, handler: &mut H) -> Option<&[u8]> {
        trace!("dispatching message {} with command {:?}", header.msg_id, Command::from(header.command));

        match Command::from(header.command) {
            Command::Control(ControlCommand::Init) => {
                info!("INIT received - server (re)started its session");
                self.receive_window.reset();
                slot.reset_sent_count();

                let reply_header = PacketHeader::new(self.identity.device_id, header.msg_id, ControlCommand::InitAck.into(), [self.identity.device_version, server_id, 0, 0]);
                Self::encode_reply(&mut self.reply_buffer, &reply_header, self.identity.device_type.as_bytes())
            }
            Command::Control(ControlCommand::InitAck) => {
                info!("INITACK received - handshake complete");
                self.receive_window.reset();
                slot.complete_handshake();
                None
            }
            Command::Control(ControlCommand::Ping) => {
                trace!("PING received");
                self.reply(header.msg_id, ControlCommand::MsgAck, [0; 4], &[])
            }
            Command::Control(ControlCommand::MsgAck) => {
                match slot.on_ack(header.msg_id) {
                    AckOutcome::Delivered { msg_id } => {
                        debug!("message {} delivered with response {}", msg_id, header.response_code());
                        handler.on_packet_delivered(msg_id, header.response_code());
                    }
                    AckOutcome::KeepaliveAcknowledged => {
                        trace!("keepalive {} acknowledged", header.msg_id);
                    }
                    AckOutcome::Ignored => {}
                }
                None
            }
            Command::Application(command) => {
                match self.receive_window.classify(header.msg_id) {
                    Acceptance::New => {
                        let response = self.receive_window.accept(header.msg_id, ||
                            handler.on_command(command, header.args, payload)
                        );
                        self.reply(header.msg_id, ControlCommand::MsgAck, [response, 0, 0, 0], &[])
                    }
                    Acceptance::Repeat { response } => {
                        debug!("message {} was processed already - resending acknowledgement", header.msg_id);
                        self.reply(header.msg_id, ControlCommand::MsgAck, [response, 0, 0, 0], &[])
                    }
                    Acceptance::Stale => {
                        debug!("discarded ghost message {} (last received: {})", header.msg_id, self.receive_window.last_received_msg_id());
                        None
                    }
                }
            }
        }
    }

    fn reply(&mut self, msg_id: u16, command: ControlCommand, args: [u16; 4], payload: &[u8]) -> Option<&[u8]> {
        let header = PacketHeader::new(self.identity.device_id, msg_id, command.into(), args);
        Self::encode_reply(&mut self.reply_buffer, &header, payload)
    }

    fn encode_reply<'a>(reply_buffer: &'a mut PacketBuffer, header: &PacketHeader, payload: &[u8]) -> Option<&'a [u8]> {
        match reply_buffer.encode(header, payload) {
            Ok(()) => Some((*reply_buffer).as_ref()),
            Err(e) => {
                warn!("unable to encode reply to message {}: {}", header.msg_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use rstest::rstest;
    use crate::clock::Timestamp;
    use crate::config::DeviceConfig;
    use crate::handler::MockDeviceHandler;
    use crate::session::outbound::RetryPolicy;
    use super::*;

    const DEVICE_ID: u64 = 0x1122334455667788;

    fn new_dispatcher() -> InboundDispatcher {
        InboundDispatcher::new(DeviceIdentity::new(DEVICE_ID, "lamp", 3), 64, 30000)
    }

    fn new_slot() -> OutboundSlot {
        OutboundSlot::new(DEVICE_ID, 64, RetryPolicy::from_config(&DeviceConfig::new(1, 2)))
    }

    fn packet(msg_id: u16, command: u16, args: [u16; 4], payload: &[u8]) -> Vec<u8> {
        let mut buf = PacketBuffer::new(64);
        buf.encode(&PacketHeader::new(DEVICE_ID, msg_id, command, args), payload).unwrap();
        buf.as_ref().to_vec()
    }

    fn msg_ack(msg_id: u16, response: u16) -> Vec<u8> {
        packet(msg_id, ControlCommand::MsgAck.into(), [response, 0, 0, 0], &[])
    }

    fn dispatch_raw(dispatcher: &mut InboundDispatcher, slot: &mut OutboundSlot, handler: &mut MockDeviceHandler, raw: &[u8]) -> Option<Vec<u8>> {
        let (header, payload) = dispatcher.parse(raw).expect("test packet should be valid");
        dispatcher.dispatch(&header, payload, 9, slot, handler)
            .map(|r| r.to_vec())
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::one_short(vec![0u8; 19])]
    #[case::wrong_device({ let mut p = packet(1, 7, [0; 4], &[]); p[0] ^= 1; p })]
    fn test_parse_rejects(#[case] raw: Vec<u8>) {
        assert!(new_dispatcher().parse(&raw).is_none());
    }

    #[test]
    fn test_parse_accepts() {
        let raw = packet(3, 7, [1, 2, 3, 4], b"abc");
        let dispatcher = new_dispatcher();
        let (header, payload) = dispatcher.parse(&raw).unwrap();
        assert_eq!(header, PacketHeader::new(DEVICE_ID, 3, 7, [1, 2, 3, 4]));
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn test_init_is_answered_with_init_ack() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        handler.expect_on_command().return_const(5u16);

        dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(10, 7, [0; 4], &[]));
        assert_eq!(dispatcher.receive_window().last_received_msg_id(), 10);

        let reply = dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(4, ControlCommand::Init.into(), [0; 4], &[]));
        assert_eq!(reply, Some(packet(4, ControlCommand::InitAck.into(), [3, 9, 0, 0], b"lamp")));
        assert_eq!(dispatcher.receive_window().last_received_msg_id(), 0);
    }

    #[test]
    fn test_init_ack_completes_handshake() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        handler.expect_on_command().return_const(5u16);
        handler.expect_on_packet_delivered().never();

        slot.prepare(Command::Control(ControlCommand::Init), [3, 9, 0, 0], b"lamp", true, false, Timestamp(0)).unwrap();
        dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(500, 7, [0; 4], &[]));

        let reply = dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(1, ControlCommand::InitAck.into(), [0; 4], &[]));
        assert_eq!(reply, None);
        assert!(!slot.is_sending());
        assert_eq!(dispatcher.receive_window().last_received_msg_id(), 0);
    }

    #[test]
    fn test_ping_is_answered_with_empty_msg_ack() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();

        let reply = dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(77, ControlCommand::Ping.into(), [0; 4], &[]));
        assert_eq!(reply, Some(msg_ack(77, 0)));
        assert_eq!(dispatcher.receive_window().last_received_msg_id(), 0);
    }

    #[test]
    fn test_msg_ack_delivers() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        handler.expect_on_packet_delivered()
            .with(eq(1), eq(42))
            .times(1)
            .return_const(());

        slot.prepare(Command::Application(7), [1, 2, 3, 4], &[], true, false, Timestamp(0)).unwrap();
        assert_eq!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &msg_ack(1, 42)), None);
        assert!(!slot.is_sending());

        // duplicate ack: ignored
        assert_eq!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &msg_ack(1, 42)), None);
    }

    #[test]
    fn test_msg_ack_for_other_id_is_ignored() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        handler.expect_on_packet_delivered().never();

        slot.prepare(Command::Application(7), [0; 4], &[], true, false, Timestamp(0)).unwrap();
        dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &msg_ack(2, 42));
        assert!(slot.is_sending());
    }

    #[test]
    fn test_keepalive_ack_is_not_reported() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        handler.expect_on_packet_delivered().never();

        slot.prepare(Command::Control(ControlCommand::Ping), [0; 4], &[], false, false, Timestamp(0)).unwrap();
        dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &msg_ack(1, 0));
        assert!(!slot.is_sending());
    }

    #[test]
    fn test_application_command_is_processed_once() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        handler.expect_on_command()
            .withf(|command, args, payload| *command == 7 && *args == [1, 2, 3, 4] && payload.to_vec() == b"on")
            .times(1)
            .return_const(42u16);

        let raw = packet(5, 7, [1, 2, 3, 4], b"on");
        let first = dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &raw);
        let second = dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &raw);

        assert_eq!(first, Some(msg_ack(5, 42)));
        assert_eq!(second, first);
    }

    #[test]
    fn test_ghost_message_is_discarded() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        let mut responses = vec![2u16, 1u16];
        handler.expect_on_command()
            .times(2)
            .returning(move |_, _, _| responses.pop().unwrap());

        assert_eq!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(10, 7, [0; 4], &[])), Some(msg_ack(10, 1)));
        assert_eq!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(11, 7, [0; 4], &[])), Some(msg_ack(11, 2)));

        // late retransmission of 10 after 11 was accepted
        assert_eq!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(10, 7, [0; 4], &[])), None);
        // 11 is still replayed
        assert_eq!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(11, 7, [0; 4], &[])), Some(msg_ack(11, 2)));
    }

    #[test]
    fn test_wrapped_message_id_is_new() {
        let mut dispatcher = new_dispatcher();
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();
        handler.expect_on_command()
            .times(2)
            .return_const(0u16);

        dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(65000, 7, [0; 4], &[]));
        assert!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(64000, 7, [0; 4], &[])).is_none());
        assert!(dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(10, 7, [0; 4], &[])).is_some());
        assert_eq!(dispatcher.receive_window().last_received_msg_id(), 10);
    }

    #[test]
    fn test_oversized_reply_is_dropped() {
        let mut dispatcher = InboundDispatcher::new(DeviceIdentity::new(DEVICE_ID, "a very long device type", 3), 30, 30000);
        let mut slot = new_slot();
        let mut handler = MockDeviceHandler::new();

        let reply = dispatch_raw(&mut dispatcher, &mut slot, &mut handler, &packet(4, ControlCommand::Init.into(), [0; 4], &[]));
        assert_eq!(reply, None);
    }
}
