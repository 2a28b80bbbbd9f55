//! Fixed-capacity packet buffers. The engine owns exactly two of them: the outbound slot's
//!  buffer (kept for verbatim retransmission) and the reply buffer used by the inbound
//!  dispatcher. Both are allocated once at construction and sized to the transport's maximum
//!  datagram size.

use std::fmt::{Debug, Formatter};
use anyhow::bail;
use bytes::buf::UninitSlice;

use crate::protocol::packet_header::PacketHeader;

#[derive(Eq)]
pub struct PacketBuffer {
    buf: Vec<u8>,
    len: usize,
}
impl PacketBuffer {
    pub fn new(capacity: usize) -> PacketBuffer {
        PacketBuffer {
            buf: vec![0; capacity],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// the largest payload that fits into this buffer after a packet header
    pub fn max_payload_len(&self) -> usize {
        self.capacity().saturating_sub(PacketHeader::SERIALIZED_LEN)
    }

    /// Replaces the buffer's content with a complete packet. Nothing is written if the packet
    ///  does not fit, so a failed encode leaves the previous packet intact.
    pub fn encode(&mut self, header: &PacketHeader, payload: &[u8]) -> anyhow::Result<()> {
        let packet_len = PacketHeader::SERIALIZED_LEN + payload.len();
        if packet_len > self.capacity() {
            bail!("packet of {} bytes exceeds the maximum packet size of {} bytes", packet_len, self.capacity());
        }

        self.clear();
        header.ser(self);
        bytes::BufMut::put_slice(self, payload);
        Ok(())
    }

    /// the header of the packet currently in the buffer, if any
    pub fn header(&self) -> Option<PacketHeader> {
        PacketHeader::deser(&mut self.as_ref()).ok()
    }

    #[cfg(test)]
    pub fn from_slice(capacity: usize, data: &[u8]) -> PacketBuffer {
        let mut result = PacketBuffer::new(capacity);
        bytes::BufMut::put_slice(&mut result, data);
        result
    }
}

impl PartialEq for PacketBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref().eq(other.as_ref())
    }
}

impl Debug for PacketBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

unsafe impl bytes::BufMut for PacketBuffer {
    fn remaining_mut(&self) -> usize {
        self.buf.len() - self.len
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        assert!(self.len + cnt <= self.capacity());
        self.len += cnt;
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        UninitSlice::new(&mut self.buf[self.len..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty_payload(20, 0, true)]
    #[case::exact_fit(24, 4, true)]
    #[case::one_too_many(24, 5, false)]
    #[case::smaller_than_header(10, 0, false)]
    fn test_encode_bounds(#[case] capacity: usize, #[case] payload_len: usize, #[case] expected_ok: bool) {
        let mut buf = PacketBuffer::new(capacity);
        let header = PacketHeader::new(1, 2, 3, [4, 5, 6, 7]);
        let payload = vec![9u8; payload_len];

        assert_eq!(buf.encode(&header, &payload).is_ok(), expected_ok);
        if expected_ok {
            assert_eq!(buf.len(), 20 + payload_len);
            assert_eq!(&buf.as_ref()[20..], payload.as_slice());
        }
        else {
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_failed_encode_keeps_previous_packet() {
        let mut buf = PacketBuffer::new(22);
        let header = PacketHeader::new(1, 2, 3, [0; 4]);
        buf.encode(&header, &[1, 2]).unwrap();
        let before = PacketBuffer::from_slice(22, buf.as_ref());

        assert!(buf.encode(&PacketHeader::new(1, 3, 3, [0; 4]), &[1, 2, 3]).is_err());
        assert_eq!(buf, before);
        assert_eq!(buf.header(), Some(header));
    }

    #[test]
    fn test_max_payload_len() {
        assert_eq!(PacketBuffer::new(512).max_payload_len(), 492);
        assert_eq!(PacketBuffer::new(20).max_payload_len(), 0);
        assert_eq!(PacketBuffer::new(5).max_payload_len(), 0);
    }
}
