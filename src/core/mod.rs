//! # Core Protocol Components
//!
//! Low-level packet handling, codecs, message envelopes and body serialization.
//!
//! ## Components
//! - **Packet**: Binary packet format with a type byte and a 24-bit length
//! - **Codec**: Tokio codec for framing over byte streams, plus the batch decoder seam
//! - **Message**: Application message envelope carried inside data packets
//! - **Serialization**: Pluggable body serializers (JSON, bincode, MessagePack)
//!
//! ## Wire Format
//! ```text
//! [Type(1)] [Length(3, big-endian)] [Body(N)]
//! ```
//!
//! ## Security
//! - Maximum body size: 16MB - 1 (the 24-bit length cannot express more)
//! - Configurable lower limit checked before any allocation
//! - Unknown packet types are rejected

pub mod codec;
pub mod message;
pub mod packet;
pub mod serialization;
