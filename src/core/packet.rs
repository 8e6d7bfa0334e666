//! Packet framing: a one byte packet type followed by a 24-bit big-endian body length.

use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the packet header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest body length expressible in the 24-bit length field.
pub const MAX_PACKET_SIZE: usize = (1 << 24) - 1;

/// Packet types understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Connection negotiation sent by the client, answered by the server
    Handshake = 0x01,
    /// Client acknowledgement of the handshake response
    HandshakeAck = 0x02,
    /// Liveness check, sent in both directions
    Heartbeat = 0x03,
    /// Application message
    Data = 0x04,
    /// Forced disconnect notification
    Kick = 0x05,
}

impl PacketType {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(PacketType::Handshake),
            0x02 => Ok(PacketType::HandshakeAck),
            0x03 => Ok(PacketType::Heartbeat),
            0x04 => Ok(PacketType::Data),
            0x05 => Ok(PacketType::Kick),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single framed unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub body: Bytes,
}

impl Packet {
    pub fn new(kind: PacketType, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// A packet with no body (heartbeats, bare kicks).
    pub fn empty(kind: PacketType) -> Self {
        Self {
            kind,
            body: Bytes::new(),
        }
    }

    /// Total encoded size including the header.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Serialize into a standalone frame.
    ///
    /// Callers are expected to have validated the body length; bodies above
    /// [`MAX_PACKET_SIZE`] are truncated in the length field, so use
    /// [`crate::core::codec::PacketCodec`] when the size is untrusted.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        write_header(&mut buf, self.kind, self.body.len());
        buf.extend_from_slice(&self.body);
        buf.to_vec()
    }

    /// Parse exactly one complete frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (kind, len) = parse_header(data)?;
        let end = HEADER_LEN + len;
        if data.len() < end {
            return Err(ProtocolError::InvalidHeader);
        }
        Ok(Self {
            kind,
            body: Bytes::copy_from_slice(&data[HEADER_LEN..end]),
        })
    }
}

/// Read the packet type and declared body length from the first four bytes.
pub(crate) fn parse_header(data: &[u8]) -> Result<(PacketType, usize)> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::InvalidHeader);
    }
    let kind = PacketType::from_byte(data[0])?;
    let len = ((data[1] as usize) << 16) | ((data[2] as usize) << 8) | data[3] as usize;
    Ok((kind, len))
}

pub(crate) fn write_header(buf: &mut BytesMut, kind: PacketType, len: usize) {
    buf.put_u8(kind.as_byte());
    buf.put_u8(((len >> 16) & 0xFF) as u8);
    buf.put_u8(((len >> 8) & 0xFF) as u8);
    buf.put_u8((len & 0xFF) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = Packet::new(PacketType::Data, vec![0xAA; 0x010203]);
        let bytes = packet.to_bytes();
        assert_eq!(&bytes[..4], &[0x04, 0x01, 0x02, 0x03]);
        assert_eq!(bytes.len(), 4 + 0x010203);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let bytes = [0x09, 0x00, 0x00, 0x00];
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::UnknownPacketType(0x09))
        ));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let bytes = [0x04, 0x00, 0x00, 0x05, 1, 2];
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::InvalidHeader)
        ));
    }

    #[test]
    fn test_empty_heartbeat() {
        let bytes = Packet::empty(PacketType::Heartbeat).to_bytes();
        assert_eq!(bytes, vec![0x03, 0, 0, 0]);
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.kind, PacketType::Heartbeat);
        assert!(decoded.body.is_empty());
    }
}
