use tracing::debug;

/// Allocates outbound message ids. Ids cycle through `1..=u16::MAX`, skipping 0 which stands
///  for 'nothing sent yet'.
///
/// NB: Ids may numerically coincide with reserved command values - they live in a different
///      header field, so there is no ambiguity.
#[derive(Debug, Clone, Default)]
pub struct MsgIdGenerator {
    current: u16,
}
impl MsgIdGenerator {
    pub fn new() -> MsgIdGenerator {
        MsgIdGenerator { current: 0 }
    }

    /// the most recently allocated id, or 0 if none was allocated
    pub fn current(&self) -> u16 {
        self.current
    }

    pub fn next_id(&mut self) -> u16 {
        self.current = if self.current == u16::MAX { 1 } else { self.current + 1 };
        self.current
    }
}


#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Acceptance {
    /// a command that was not processed before: the application handler must run
    New,
    /// the command that was processed most recently, arriving again (e.g. because our
    ///  acknowledgement got lost): replay the cached response
    Repeat { response: u16 },
    /// an older command that was superseded already - a 'ghost' retransmission arriving late
    Stale,
}

/// The inbound duplicate-suppression window. It has a depth of one: it remembers the id of the
///  last command that was fully processed, and the response the application returned for it.
///
/// Ids are compared with a tolerance for wrap-around: an incoming id that is numerically far
///  below the last accepted id is treated as its successor after the 16 bit id space wrapped.
#[derive(Debug, Clone)]
pub struct ReceiveWindow {
    last_received_msg_id: u16,
    last_response: u16,
    wraparound_threshold: u16,
}
impl ReceiveWindow {
    pub fn new(wraparound_threshold: u16) -> ReceiveWindow {
        ReceiveWindow {
            last_received_msg_id: 0,
            last_response: 0,
            wraparound_threshold,
        }
    }

    pub fn last_received_msg_id(&self) -> u16 {
        self.last_received_msg_id
    }

    pub fn last_response(&self) -> u16 {
        self.last_response
    }

    pub fn classify(&self, msg_id: u16) -> Acceptance {
        let last = self.last_received_msg_id;
        if msg_id > last || last - msg_id > self.wraparound_threshold {
            Acceptance::New
        }
        else if msg_id == last {
            Acceptance::Repeat { response: self.last_response }
        }
        else {
            Acceptance::Stale
        }
    }

    /// Advances the window to a new message id and caches the response produced by `process`.
    ///  This is meant for ids that were classified as [Acceptance::New].
    pub fn accept(&mut self, msg_id: u16, process: impl FnOnce() -> u16) -> u16 {
        self.last_received_msg_id = msg_id;
        self.last_response = process();
        self.last_response
    }

    /// Forget everything - this happens on every handshake, since the peer starts a new id
    ///  sequence then.
    pub fn reset(&mut self) {
        debug!("resetting receive window (last received msg id was {})", self.last_received_msg_id);
        self.last_received_msg_id = 0;
        self.last_response = 0;
    }
}
