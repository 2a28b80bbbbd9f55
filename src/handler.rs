#[cfg(test)] use mockall::automock;
use crate::clock::Timestamp;

/// This is the application's side of the protocol: the engine calls these hooks on state
///  transitions and for incoming application commands. All hooks are called synchronously
///  from inside `tick()`, `send()` or `on_datagram()`.
///
/// Connectivity hooks are edge-triggered, i.e. they are called on transitions only.
///
/// All hooks except [DeviceHandler::on_command] have empty default implementations.
#[cfg_attr(test, automock)]
pub trait DeviceHandler {
    fn on_link_connected(&mut self, _now: Timestamp) {}

    fn on_link_disconnected(&mut self, _now: Timestamp) {}

    fn on_server_connected(&mut self, _now: Timestamp) {}

    /// Called when the server session is lost, either because the link went down or because a
    ///  message was not acknowledged after the configured number of attempts.
    fn on_server_disconnected(&mut self, _now: Timestamp) {}

    /// The server acknowledged a message sent by the application, returning `response`.
    fn on_packet_delivered(&mut self, _msg_id: u16, _response: u16) {}

    /// A message sent by the application was superseded by a later send before it was
    ///  acknowledged.
    fn on_packet_cancelled(&mut self, _msg_id: u16) {}

    /// An application command arrived from the server. The returned response code is sent back
    ///  in the acknowledgement, and replayed if the server repeats the command.
    fn on_command(&mut self, command: u16, args: [u16; 4], payload: &[u8]) -> u16;
}
