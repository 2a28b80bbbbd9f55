use anyhow::anyhow;
use bytes::{Buf, BufMut};

/// Every packet starts with this fixed-layout header, followed by an optional payload that
///  extends to the end of the datagram. All numbers are little-endian:
///
/// ```ascii
///  0: device id (u64)
///  8: message id (u16)
/// 10: command (u16)
/// 12: arg1 (u16) - carries the response code in MSGACK packets
/// 14: arg2 (u16)
/// 16: arg3 (u16)
/// 18: arg4 (u16)
/// 20: payload
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PacketHeader {
    pub device_id: u64,
    pub msg_id: u16,
    pub command: u16,
    pub args: [u16; 4],
}

impl PacketHeader {
    pub const SERIALIZED_LEN: usize = std::mem::size_of::<u64>() + 6 * std::mem::size_of::<u16>();

    pub fn new(device_id: u64, msg_id: u16, command: u16, args: [u16; 4]) -> PacketHeader {
        PacketHeader {
            device_id,
            msg_id,
            command,
            args,
        }
    }

    /// MSGACK packets carry the application's response code in the first argument
    pub fn response_code(&self) -> u16 {
        self.args[0]
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.device_id);
        buf.put_u16_le(self.msg_id);
        buf.put_u16_le(self.command);
        for arg in self.args {
            buf.put_u16_le(arg);
        }
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PacketHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            return Err(anyhow!("packet is shorter than header size: {} < {} bytes", buf.remaining(), Self::SERIALIZED_LEN));
        }

        let device_id = buf.get_u64_le();
        let msg_id = buf.get_u16_le();
        let command = buf.get_u16_le();
        let args = [
            buf.get_u16_le(),
            buf.get_u16_le(),
            buf.get_u16_le(),
            buf.get_u16_le(),
        ];

        Ok(PacketHeader {
            device_id,
            msg_id,
            command,
            args,
        })
    }
}

/// Splits a received datagram into its header and payload
pub fn decode_packet(packet: &[u8]) -> anyhow::Result<(PacketHeader, &[u8])> {
    let mut buf = packet;
    let header = PacketHeader::deser(&mut buf)?;
    Ok((header, buf))
}
