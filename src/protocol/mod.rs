//! # Protocol Layer
//!
//! Routing and connection negotiation on top of the packet codec.
//!
//! ## Components
//! - **Route**: parses `serverType.service.method` addresses
//! - **Handshake**: client hello / server settings payloads and kick reasons

pub mod handshake;
pub mod route;

#[cfg(test)]
mod tests;
