//! Descriptor of the server process this dispatcher runs in.
//!
//! Membership and discovery live outside this crate; the dispatcher only needs
//! to know its own server type to decide whether a route is served locally.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Unique id of this process within the cluster
    pub id: String,
    /// Server type routes are addressed to, e.g. `connector` or `room`
    #[serde(rename = "type")]
    pub server_type: String,
    /// Whether this server accepts client connections
    #[serde(default)]
    pub frontend: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Server {
    pub fn new(id: impl Into<String>, server_type: impl Into<String>, frontend: bool) -> Self {
        Self {
            id: id.into(),
            server_type: server_type.into(),
            frontend,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_server_serializes_type_field() {
        let server = Server::new("room-1", "room", false).with_metadata("region", "eu");
        let value = serde_json::to_value(&server).unwrap();
        assert_eq!(value["type"], "room");
        assert_eq!(value["metadata"]["region"], "eu");

        let back: Server = serde_json::from_value(value).unwrap();
        assert_eq!(back, server);
    }
}
