//! # Serialization Formats
//!
//! Body serializers used by handlers and by the dispatcher when it builds
//! error responses. The message envelope ([`crate::core::message`]) is
//! independent of the body format; only the bytes inside a message go through
//! a [`SerializationFormat`].
//!
//! ## Formats
//! - **JSON**: default, what browser and engine clients usually speak
//! - **Bincode**: compact binary for server-to-server traffic
//! - **MessagePack**: compact binary with a self-describing layout
//!
//! ## Usage
//! ```rust
//! use realtime_dispatch::core::serialization::SerializationFormat;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Join { room: String }
//!
//! let format = SerializationFormat::Json;
//! let bytes = format.marshal(&Join { room: "lobby".into() }).unwrap();
//! let back: Join = format.unmarshal(&bytes).unwrap();
//! assert_eq!(back.room, "lobby");
//! ```

use crate::error::{ProtocolError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Human-readable JSON (default, client interop)
    #[default]
    Json,
    /// Binary compact format (fastest)
    Bincode,
    /// Compact binary format (MessagePack)
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl SerializationFormat {
    /// Name advertised to clients in the handshake response
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Json => "json",
            SerializationFormat::Bincode => "bincode",
            SerializationFormat::MessagePack => "msgpack",
        }
    }

    /// Serialize a value to bytes
    pub fn marshal<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializationFormat::Json => {
                serde_json::to_vec(value).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::Bincode => {
                bincode::serialize(value).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => rmp_serde::to_vec_named(value)
                .map_err(|e| ProtocolError::SerializeError(e.to_string())),
        }
    }

    /// Deserialize a value from bytes
    pub fn unmarshal<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            SerializationFormat::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::Bincode => bincode::deserialize(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
        }
    }
}

impl FromStr for SerializationFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(SerializationFormat::Json),
            "bincode" => Ok(SerializationFormat::Bincode),
            "msgpack" | "messagepack" => Ok(SerializationFormat::MessagePack),
            other => Err(ProtocolError::ConfigError(format!(
                "unknown serializer: {other}"
            ))),
        }
    }
}
