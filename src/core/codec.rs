//! # Packet Codec
//!
//! Frames and deframes byte streams into [`Packet`]s.
//!
//! [`PacketCodec`] serves two callers:
//! - transports driving a `tokio_util::codec::Framed` stream, through the
//!   [`Decoder`] / [`Encoder`] impls;
//! - the dispatcher, through the [`PacketDecoder`] / [`PacketEncoder`] seams, which
//!   decode every complete frame in a buffer at once and leave the partial tail
//!   in place for the next read.
//!
//! Decoding never waits for more bytes: an incomplete frame simply stays in the
//! buffer. A declared length above the configured maximum is a protocol
//! violation and the connection should be closed.

use crate::core::packet::{parse_header, write_header, Packet, PacketType, HEADER_LEN, MAX_PACKET_SIZE};
use crate::error::{ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

/// Turns raw stream bytes into packets.
pub trait PacketDecoder: Send + Sync {
    /// Decode all complete frames in `buf`, leaving any partial frame behind.
    fn decode_packets(&self, buf: &mut BytesMut) -> Result<Vec<Packet>>;
}

/// Turns a packet type and body into wire bytes.
pub trait PacketEncoder: Send + Sync {
    fn encode_packet(&self, kind: PacketType, body: &[u8]) -> Result<Bytes>;
}

/// Length-prefixed packet codec with a configurable body limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCodec {
    max_packet_size: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

impl PacketCodec {
    /// Codec with a body limit, clamped to what the length field can express.
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size: max_packet_size.min(MAX_PACKET_SIZE),
        }
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Pull one complete frame off the front of `src`, if there is one.
    fn next_frame(&self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let (kind, len) = parse_header(&src[..])?;
        if len > self.max_packet_size {
            return Err(ProtocolError::OversizedPacket(len));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(HEADER_LEN + len);
        let body = frame.split_off(HEADER_LEN).freeze();
        Ok(Some(Packet { kind, body }))
    }
}

impl PacketDecoder for PacketCodec {
    fn decode_packets(&self, buf: &mut BytesMut) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        while let Some(packet) = self.next_frame(buf)? {
            packets.push(packet);
        }
        Ok(packets)
    }
}

impl PacketEncoder for PacketCodec {
    fn encode_packet(&self, kind: PacketType, body: &[u8]) -> Result<Bytes> {
        if body.len() > self.max_packet_size {
            return Err(ProtocolError::OversizedPacket(body.len()));
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
        write_header(&mut buf, kind, body.len());
        buf.extend_from_slice(body);
        Ok(buf.freeze())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        self.next_frame(src)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        if item.body.len() > self.max_packet_size {
            return Err(ProtocolError::OversizedPacket(item.body.len()));
        }
        dst.reserve(HEADER_LEN + item.body.len());
        write_header(dst, item.kind, item.body.len());
        dst.extend_from_slice(&item.body);
        Ok(())
    }
}

/// Pre-encoded frames are written through unchanged.
impl Encoder<Bytes> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Adapts any [`PacketDecoder`] to `tokio_util`'s [`Decoder`], yielding every
/// packet completed by a read as one batch.
#[derive(Clone)]
pub struct PacketBatches {
    decoder: Arc<dyn PacketDecoder>,
}

impl PacketBatches {
    pub fn new(decoder: Arc<dyn PacketDecoder>) -> Self {
        Self { decoder }
    }
}

impl Decoder for PacketBatches {
    type Item = Vec<Packet>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<Packet>>> {
        let packets = self.decoder.decode_packets(src)?;
        Ok((!packets.is_empty()).then_some(packets))
    }
}
