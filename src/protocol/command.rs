use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The four highest command values are reserved for the protocol itself. Everything below is
///  passed through to the application.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ControlCommand {
    /// handshake announce, sent by the device on start (and by a server that lost its state)
    Init = 0xffff,
    /// handshake acknowledgement
    InitAck = 0xfffe,
    /// acknowledgement of a single command or keepalive, carrying the response code
    MsgAck = 0xfffd,
    /// keepalive, acknowledged with an empty MSGACK
    Ping = 0xfffc,
}

impl ControlCommand {
    /// the highest command value available to the application
    pub const MAX_APPLICATION_COMMAND: u16 = 0xfffb;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Command {
    Control(ControlCommand),
    Application(u16),
}

impl From<u16> for Command {
    fn from(value: u16) -> Self {
        match ControlCommand::try_from(value) {
            Ok(control) => Command::Control(control),
            Err(_) => Command::Application(value),
        }
    }
}

impl From<Command> for u16 {
    fn from(value: Command) -> Self {
        match value {
            Command::Control(control) => control.into(),
            Command::Application(raw) => raw,
        }
    }
}

impl From<ControlCommand> for Command {
    fn from(value: ControlCommand) -> Self {
        Command::Control(value)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::init(65535, Command::Control(ControlCommand::Init))]
    #[case::init_ack(65534, Command::Control(ControlCommand::InitAck))]
    #[case::msg_ack(65533, Command::Control(ControlCommand::MsgAck))]
    #[case::ping(65532, Command::Control(ControlCommand::Ping))]
    #[case::highest_application(65531, Command::Application(65531))]
    #[case::zero(0, Command::Application(0))]
    #[case::seven(7, Command::Application(7))]
    fn test_classify(#[case] raw: u16, #[case] expected: Command) {
        assert_eq!(Command::from(raw), expected);
        assert_eq!(u16::from(expected), raw);
    }

    #[test]
    fn test_max_application_command() {
        assert_eq!(Command::from(ControlCommand::MAX_APPLICATION_COMMAND), Command::Application(ControlCommand::MAX_APPLICATION_COMMAND));
        assert!(matches!(Command::from(ControlCommand::MAX_APPLICATION_COMMAND + 1), Command::Control(_)));
    }
}
