//! # Message Envelope
//!
//! The application-level unit carried inside a data packet.
//!
//! ## Wire Format
//! ```text
//! [Flag(1)] [Id(varint, request/response only)] [Route(request/notify/push only)] [Data(N)]
//!
//! Flag:  bit 0     route is a 2-byte dictionary code instead of len + utf8
//!        bits 1-3  message type
//!        bit 4     data is compressed
//!        bit 5     response carries an error payload
//! Route: [Len(1)] [Utf8(Len)]   or   [Code(2, big-endian)]
//! ```
//!
//! Ids are base-128 varints (low groups first, high bit = continuation).

use crate::error::{constants, ProtocolError, Result};
use crate::utils::compression::{compress_if_smaller, decompress, CompressionKind};
use bytes::Bytes;
use std::collections::HashMap;

const ROUTE_COMPRESSED_MASK: u8 = 0x01;
const TYPE_MASK: u8 = 0x07;
const DATA_COMPRESSED_MASK: u8 = 0x10;
const ERROR_MASK: u8 = 0x20;

/// Longest route the one-byte length prefix can describe.
pub const MAX_ROUTE_LEN: usize = u8::MAX as usize;

/// Message types carried in the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Request = 0x00,
    Notify = 0x01,
    Response = 0x02,
    Push = 0x03,
}

impl MessageType {
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0x00 => Ok(MessageType::Request),
            0x01 => Ok(MessageType::Notify),
            0x02 => Ok(MessageType::Response),
            0x03 => Ok(MessageType::Push),
            _ => Err(ProtocolError::InvalidMessage(
                constants::ERR_INVALID_MESSAGE_TYPE.into(),
            )),
        }
    }

    /// Request and response messages carry a correlation id.
    pub fn has_id(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Response)
    }

    /// Everything except responses is addressed by route.
    pub fn has_route(self) -> bool {
        !matches!(self, MessageType::Response)
    }
}

/// A decoded unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    /// Nonzero exactly for requests and their responses
    pub id: u64,
    pub route: String,
    pub data: Bytes,
    /// Set on responses whose data is an error payload
    pub err: bool,
}

impl Message {
    pub fn request(id: u64, route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Request,
            id,
            route: route.into(),
            data: data.into(),
            err: false,
        }
    }

    pub fn notify(route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Notify,
            id: 0,
            route: route.into(),
            data: data.into(),
            err: false,
        }
    }

    pub fn response(id: u64, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Response,
            id,
            route: String::new(),
            data: data.into(),
            err: false,
        }
    }

    pub fn error_response(id: u64, data: impl Into<Bytes>) -> Self {
        Self {
            err: true,
            ..Self::response(id, data)
        }
    }

    pub fn push(route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Push,
            id: 0,
            route: route.into(),
            data: data.into(),
            err: false,
        }
    }

    /// Whether the sender is waiting for a response.
    pub fn expects_response(&self) -> bool {
        self.kind == MessageType::Request && self.id != 0
    }
}

/// Wire-level message envelope, independent of the body serializer.
pub trait MessageEncoder: Send + Sync {
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> Result<Message>;
    fn is_compression_enabled(&self) -> bool;

    /// Route codes clients may use instead of full route strings.
    fn route_dictionary(&self) -> HashMap<String, u16> {
        HashMap::new()
    }
}

/// Default [`MessageEncoder`]: optional data compression and an optional route
/// dictionary.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    compression: Option<CompressionKind>,
    compression_threshold: usize,
    routes: HashMap<String, u16>,
    codes: HashMap<u16, String>,
}

impl MessageCodec {
    /// Codec with data compression switched on or off.
    pub fn new(data_compression: bool) -> Self {
        Self {
            compression: data_compression.then(CompressionKind::default),
            ..Self::default()
        }
    }

    pub fn with_compression(mut self, kind: CompressionKind, threshold_bytes: usize) -> Self {
        self.compression = Some(kind);
        self.compression_threshold = threshold_bytes;
        self
    }

    /// Route dictionary shared with clients during the handshake.
    pub fn with_dictionary<I, S>(mut self, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u16)>,
        S: Into<String>,
    {
        for (route, code) in entries {
            let route = route.into();
            if self.codes.contains_key(&code) || self.routes.contains_key(&route) {
                return Err(ProtocolError::ConfigError(format!(
                    "duplicated route dictionary entry: {route} ({code})"
                )));
            }
            self.codes.insert(code, route.clone());
            self.routes.insert(route, code);
        }
        Ok(self)
    }

    /// Kind used for compressed data; `Zstd` when compression is off, since
    /// inbound messages may still arrive compressed.
    fn compression_kind(&self) -> CompressionKind {
        self.compression.unwrap_or_default()
    }
}

impl MessageEncoder for MessageCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let mut flag = (message.kind as u8) << 1;
        if message.err {
            flag |= ERROR_MASK;
        }

        let code = if message.kind.has_route() {
            self.routes.get(&message.route).copied()
        } else {
            None
        };
        if code.is_some() {
            flag |= ROUTE_COMPRESSED_MASK;
        }

        let (data, compressed) = match self.compression {
            Some(kind) => compress_if_smaller(&message.data, kind, self.compression_threshold)?,
            None => (message.data.to_vec(), false),
        };
        if compressed {
            flag |= DATA_COMPRESSED_MASK;
        }

        let mut buf = Vec::with_capacity(1 + 10 + 1 + message.route.len() + data.len());
        buf.push(flag);

        if message.kind.has_id() {
            write_varint(&mut buf, message.id);
        }

        if message.kind.has_route() {
            match code {
                Some(code) => buf.extend_from_slice(&code.to_be_bytes()),
                None => {
                    if message.route.is_empty() {
                        return Err(ProtocolError::InvalidMessage(constants::ERR_EMPTY_ROUTE.into()));
                    }
                    if message.route.len() > MAX_ROUTE_LEN {
                        return Err(ProtocolError::InvalidMessage(
                            constants::ERR_ROUTE_TOO_LONG.into(),
                        ));
                    }
                    buf.push(message.route.len() as u8);
                    buf.extend_from_slice(message.route.as_bytes());
                }
            }
        }

        buf.extend_from_slice(&data);
        Ok(buf)
    }

    fn decode(&self, data: &[u8]) -> Result<Message> {
        let (kind, id, mut offset) = read_head(data)?;
        let flag = data[0];

        let mut route = String::new();
        if kind.has_route() {
            if flag & ROUTE_COMPRESSED_MASK != 0 {
                let bytes = data.get(offset..offset + 2).ok_or_else(truncated)?;
                let code = u16::from_be_bytes([bytes[0], bytes[1]]);
                route = self.codes.get(&code).cloned().ok_or_else(|| {
                    ProtocolError::InvalidRoute(format!("unknown route code {code}"))
                })?;
                offset += 2;
            } else {
                let len = *data.get(offset).ok_or_else(truncated)? as usize;
                offset += 1;
                let bytes = data.get(offset..offset + len).ok_or_else(truncated)?;
                route = std::str::from_utf8(bytes)
                    .map_err(|e| ProtocolError::InvalidRoute(e.to_string()))?
                    .to_string();
                offset += len;
            }
        }

        let body = &data[offset..];
        let body = if flag & DATA_COMPRESSED_MASK != 0 {
            Bytes::from(decompress(body, self.compression_kind())?)
        } else {
            Bytes::copy_from_slice(body)
        };

        Ok(Message {
            kind,
            id,
            route,
            data: body,
            err: flag & ERROR_MASK != 0,
        })
    }

    fn is_compression_enabled(&self) -> bool {
        self.compression.is_some()
    }

    fn route_dictionary(&self) -> HashMap<String, u16> {
        self.routes.clone()
    }
}

/// Recover the type and id of a message whose route or data could not be
/// decoded, so a malformed request can still be answered.
pub fn peek_id(data: &[u8]) -> Option<(MessageType, u64)> {
    read_head(data).ok().map(|(kind, id, _)| (kind, id))
}

fn read_head(data: &[u8]) -> Result<(MessageType, u64, usize)> {
    let flag = *data.first().ok_or_else(truncated)?;
    let kind = MessageType::from_bits((flag >> 1) & TYPE_MASK)?;
    let mut offset = 1;
    let mut id = 0;
    if kind.has_id() {
        let (value, read) = read_varint(&data[offset..])?;
        id = value;
        offset += read;
    }
    if kind == MessageType::Request && id == 0 {
        return Err(ProtocolError::InvalidMessage(constants::ERR_ZERO_REQUEST_ID.into()));
    }
    Ok((kind, id, offset))
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn read_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in data.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ProtocolError::InvalidMessage(constants::ERR_INVALID_VARINT.into()))
}

fn truncated() -> ProtocolError {
    ProtocolError::InvalidMessage(constants::ERR_TRUNCATED_MESSAGE.into())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_request_layout() {
        let codec = MessageCodec::new(false);
        let bytes = codec
            .encode(&Message::request(300, "room.join", b"{}".to_vec()))
            .unwrap();
        // flag, varint(300) = [0xAC, 0x02], len, route, data
        assert_eq!(bytes[0], 0x00);
        assert_eq!(&bytes[1..3], &[0xAC, 0x02]);
        assert_eq!(bytes[3] as usize, "room.join".len());
        assert_eq!(&bytes[4..13], b"room.join");
        assert_eq!(&bytes[13..], b"{}");

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.id, 300);
        assert_eq!(decoded.route, "room.join");
        assert!(decoded.expects_response());
    }

    #[test]
    fn test_notify_has_no_id() {
        let codec = MessageCodec::new(false);
        let bytes = codec.encode(&Message::notify("chat.say", b"hi".to_vec())).unwrap();
        assert_eq!(bytes[0], 0x02);
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.kind, MessageType::Notify);
        assert_eq!(decoded.id, 0);
        assert!(!decoded.expects_response());
    }

    #[test]
    fn test_error_response_flag() {
        let codec = MessageCodec::new(false);
        let bytes = codec.encode(&Message::error_response(9, b"boom".to_vec())).unwrap();
        assert_eq!(bytes[0], (0x02 << 1) | ERROR_MASK);
        let decoded = codec.decode(&bytes).unwrap();
        assert!(decoded.err);
        assert!(decoded.route.is_empty());
        assert_eq!(decoded.data.as_ref(), b"boom");
    }

    #[test]
    fn test_dictionary_compresses_route() {
        let codec = MessageCodec::new(false)
            .with_dictionary([("room.join", 7u16)])
            .unwrap();
        let bytes = codec.encode(&Message::notify("room.join", Bytes::new())).unwrap();
        assert_eq!(bytes, vec![0x02 | ROUTE_COMPRESSED_MASK, 0x00, 0x07]);
        assert_eq!(codec.decode(&bytes).unwrap().route, "room.join");

        let plain = MessageCodec::new(false);
        assert!(matches!(plain.decode(&bytes), Err(ProtocolError::InvalidRoute(_))));
    }

    #[test]
    fn test_duplicate_dictionary_entry_rejected() {
        let result = MessageCodec::new(false).with_dictionary([("a.b", 1u16), ("c.d", 1u16)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_compressed_data() {
        let codec = MessageCodec::new(true);
        let data = b"{\"x\":1}".repeat(100);
        let bytes = codec.encode(&Message::push("world.tick", data.clone())).unwrap();
        assert_ne!(bytes[0] & DATA_COMPRESSED_MASK, 0);
        assert!(bytes.len() < data.len());
        assert_eq!(codec.decode(&bytes).unwrap().data.as_ref(), &data[..]);
    }

    #[test]
    fn test_peek_survives_bad_route() {
        // request id 5, route length claims 200 bytes but only 3 follow
        let bytes = [0x00, 0x05, 200, b'a', b'b', b'c'];
        let codec = MessageCodec::new(false);
        assert!(codec.decode(&bytes).is_err());
        assert_eq!(peek_id(&bytes), Some((MessageType::Request, 5)));
    }

    #[test]
    fn test_request_without_id_rejected() {
        let codec = MessageCodec::new(false);
        let bytes = [0x00, 0x00, 9, b'R', b'o', b'o', b'm', b'.', b'J', b'o', b'i', b'n'];
        assert!(codec.decode(&bytes).is_err());
        assert_eq!(peek_id(&bytes), None);
    }

    #[test]
    fn test_invalid_type_and_truncation() {
        let codec = MessageCodec::new(false);
        assert!(codec.decode(&[]).is_err());
        assert!(codec.decode(&[0x0E]).is_err());
        assert!(codec.decode(&[0x00, 0x80]).is_err());
    }

    #[test]
    fn test_route_too_long() {
        let codec = MessageCodec::new(false);
        let route = "r".repeat(MAX_ROUTE_LEN + 1);
        assert!(codec.encode(&Message::notify(route, Bytes::new())).is_err());
    }

    #[test]
    fn test_varint_boundaries() {
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(read_varint(&buf).unwrap(), (value, buf.len()));
        }
    }
}
