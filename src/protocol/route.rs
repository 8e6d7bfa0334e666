//! Routes: `serverType.service.method`, or `service.method` for the server the
//! session is connected to.

use crate::error::{constants, ProtocolError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Empty when the route targets the local server
    pub server_type: String,
    pub service: String,
    pub method: String,
}

impl Route {
    pub fn new(
        server_type: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            server_type: server_type.into(),
            service: service.into(),
            method: method.into(),
        }
    }

    /// Parse a two- or three-part route.
    pub fn decode(route: &str) -> Result<Self> {
        if route.is_empty() {
            return Err(ProtocolError::InvalidRoute(constants::ERR_EMPTY_ROUTE.into()));
        }

        let parts: Vec<&str> = route.split('.').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(ProtocolError::InvalidRoute(route.to_string()));
        }

        match parts.as_slice() {
            [service, method] => Ok(Self::new("", *service, *method)),
            [server_type, service, method] => Ok(Self::new(*server_type, *service, *method)),
            _ => Err(ProtocolError::InvalidRoute(route.to_string())),
        }
    }

    /// Registry key: `service.method`.
    pub fn short(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }

    /// Whether the route names a server type other than `local_type`.
    pub fn is_remote_for(&self, local_type: &str) -> bool {
        !self.server_type.is_empty() && self.server_type != local_type
    }
}

impl FromStr for Route {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_type.is_empty() {
            write!(f, "{}.{}", self.service, self.method)
        } else {
            write!(f, "{}.{}.{}", self.server_type, self.service, self.method)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_three_part_route() {
        let route = Route::decode("room.Room.Join").unwrap();
        assert_eq!(route.server_type, "room");
        assert_eq!(route.short(), "Room.Join");
        assert_eq!(route.to_string(), "room.Room.Join");
        assert!(route.is_remote_for("connector"));
        assert!(!route.is_remote_for("room"));
    }

    #[test]
    fn test_session_scoped_route_is_local() {
        let route: Route = "Lobby.Enter".parse().unwrap();
        assert!(route.server_type.is_empty());
        assert!(!route.is_remote_for("connector"));
        assert_eq!(route.to_string(), "Lobby.Enter");
    }

    #[test]
    fn test_malformed_routes() {
        for bad in ["", "Lobby", "a.b.c.d", "a..b", ".a.b", "a.b."] {
            assert!(
                matches!(Route::decode(bad), Err(ProtocolError::InvalidRoute(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
