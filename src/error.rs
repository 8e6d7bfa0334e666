//! # Error Types
//!
//! Error handling for the dispatch core.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`ProtocolError`]. Variants are grouped the way the dispatcher treats them:
//!
//! ## Error Categories
//! - **Registration Errors**: duplicate component names, components without methods
//! - **Protocol Errors**: malformed, oversized or unknown frames (the transport closes the connection)
//! - **Decode Errors**: malformed message envelopes or bodies
//! - **Routing Errors**: unparsable or unknown routes
//! - **Handler Errors**: business errors and recovered panics raised by handlers
//! - **Remote Errors**: failures reported by the remote service
//! - **Lifecycle Errors**: closed sessions, shutdown in progress, fatal configuration
//!
//! Errors that reach a client are converted to an [`ErrorPayload`] through
//! [`ProtocolError::code`] and sent back in a response message.
//!
//! ## Example Usage
//! ```rust
//! use realtime_dispatch::error::{ProtocolError, Result};
//!
//! fn lookup(route: &str) -> Result<()> {
//!     Err(ProtocolError::RouteNotFound(route.to_string()))
//! }
//!
//! let err = lookup("Room.Join").unwrap_err();
//! assert_eq!(err.code(), "NOT_FOUND");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use thiserror::Error;

/// Error codes carried in error responses.
pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL: &str = "INTERNAL";
    pub const REMOTE_FAILURE: &str = "REMOTE_FAILURE";
    pub const SHUTTING_DOWN: &str = "SHUTTING_DOWN";
    pub const SESSION_CLOSED: &str = "SESSION_CLOSED";
}

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    pub const ERR_DATA_BEFORE_HANDSHAKE: &str = "data packet received before handshake";
    pub const ERR_NO_REMOTE_SERVICE: &str = "no remote service configured";
    pub const ERR_EMPTY_ROUTE: &str = "route is empty";
    pub const ERR_TRUNCATED_MESSAGE: &str = "truncated message envelope";
    pub const ERR_INVALID_MESSAGE_TYPE: &str = "invalid message type";
    pub const ERR_INVALID_VARINT: &str = "malformed message id";
    pub const ERR_ZERO_REQUEST_ID: &str = "request id must be nonzero";
    pub const ERR_ROUTE_TOO_LONG: &str = "route longer than 255 bytes";
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("handler: service already defined: {0}")]
    ServiceAlreadyDefined(String),

    #[error("handler: method already defined: {0}")]
    MethodAlreadyDefined(String),

    #[error("type {0} has no exported methods of suitable type")]
    NoSuitableMethods(String),

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Unexpected message type")]
    UnexpectedMessage,

    #[error("{message}")]
    Handler { code: String, message: String },

    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    #[error("Remote call failed: {0}")]
    RemoteError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Shutdown in progress")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Builds a business error with a caller-chosen code.
    pub fn handler(code: impl Into<String>, message: impl Into<String>) -> Self {
        ProtocolError::Handler {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire error code reported to clients for this error.
    pub fn code(&self) -> &str {
        match self {
            ProtocolError::Handler { code, .. } => code,
            ProtocolError::SerializeError(_)
            | ProtocolError::DeserializeError(_)
            | ProtocolError::Serialization(_)
            | ProtocolError::InvalidMessage(_)
            | ProtocolError::InvalidRoute(_)
            | ProtocolError::DecompressionFailure => codes::BAD_REQUEST,
            ProtocolError::RouteNotFound(_) => codes::NOT_FOUND,
            ProtocolError::RemoteError(_) => codes::REMOTE_FAILURE,
            ProtocolError::ShuttingDown => codes::SHUTTING_DOWN,
            ProtocolError::ConnectionClosed => codes::SESSION_CLOSED,
            _ => codes::INTERNAL,
        }
    }

    /// Errors after which the transport must drop the connection.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidHeader
                | ProtocolError::UnknownPacketType(_)
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::HandshakeError(_)
                | ProtocolError::UnexpectedMessage
                | ProtocolError::ConnectionClosed
        )
    }
}

/// Error body sent to clients inside an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub msg: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<&ProtocolError> for ErrorPayload {
    fn from(err: &ProtocolError) -> Self {
        Self {
            code: err.code().to_string(),
            msg: err.to_string(),
            metadata: HashMap::new(),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(ProtocolError::InvalidRoute("x".into()).code(), codes::BAD_REQUEST);
        assert_eq!(ProtocolError::RouteNotFound("Room.Join".into()).code(), codes::NOT_FOUND);
        assert_eq!(ProtocolError::HandlerPanic("boom".into()).code(), codes::INTERNAL);
        assert_eq!(ProtocolError::RemoteError("down".into()).code(), codes::REMOTE_FAILURE);
        assert_eq!(ProtocolError::ShuttingDown.code(), codes::SHUTTING_DOWN);
        assert_eq!(ProtocolError::handler("ROOM_FULL", "no seats").code(), "ROOM_FULL");
    }

    #[test]
    fn test_payload_carries_handler_message() {
        let payload = ErrorPayload::from(&ProtocolError::handler("ROOM_FULL", "no seats"));
        assert_eq!(payload.code, "ROOM_FULL");
        assert_eq!(payload.msg, "no seats");
        assert!(payload.metadata.is_empty());
    }

    #[test]
    fn test_only_framing_errors_drop_the_connection() {
        assert!(ProtocolError::UnknownPacketType(0x7F).is_protocol_violation());
        assert!(ProtocolError::UnexpectedMessage.is_protocol_violation());
        assert!(!ProtocolError::RouteNotFound("a.b".into()).is_protocol_violation());
        assert!(!ProtocolError::ShuttingDown.is_protocol_violation());
    }
}
