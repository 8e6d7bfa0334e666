//! Connection handshake payloads.
//!
//! The client opens with a handshake packet whose body is a JSON object
//! describing the client; the server answers with a handshake packet carrying
//! the negotiated settings (heartbeat interval, body serializer, route
//! dictionary). Both are always JSON, whatever serializer the message bodies
//! use, because the client cannot know the body format before this exchange.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Status code of a successful handshake.
pub const HANDSHAKE_OK: u16 = 200;

/// Client description sent in the handshake packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    #[serde(default)]
    pub sys: HandshakeClientData,
    /// Arbitrary application data supplied by the client
    #[serde(default)]
    pub user: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeClientData {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub lib_version: String,
    #[serde(default)]
    pub client_build_number: String,
    #[serde(default)]
    pub client_version: String,
}

/// Server reply to a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub code: u16,
    pub sys: HandshakeSys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeSys {
    /// Whole seconds between client heartbeats, rounded down
    pub heartbeat: u64,
    /// Exact heartbeat interval; zero when the server does not check heartbeats
    #[serde(default)]
    pub heartbeat_ms: u64,
    pub serializer: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub dict: HashMap<String, u16>,
}

impl HandshakeResponse {
    /// `interval` is how often the client must heartbeat, not the server's
    /// kick timeout.
    pub fn new(interval: Duration, serializer: &str, dict: HashMap<String, u16>) -> Self {
        Self {
            code: HANDSHAKE_OK,
            sys: HandshakeSys {
                heartbeat: interval.as_secs(),
                heartbeat_ms: interval.as_millis() as u64,
                serializer: serializer.to_string(),
                dict,
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
    }
}

/// Parse the client handshake body. An empty body is a valid, anonymous client.
pub fn parse_handshake(body: &[u8]) -> Result<HandshakeRequest> {
    if body.is_empty() {
        return Ok(HandshakeRequest::default());
    }
    let request: HandshakeRequest = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::HandshakeError(format!("malformed handshake: {e}")))?;
    debug!(
        platform = %request.sys.platform,
        client_version = %request.sys.client_version,
        "Handshake received"
    );
    Ok(request)
}

/// Body of a kick packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickReason {
    pub reason: String,
}

impl KickReason {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
    }
}
