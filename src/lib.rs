//! # realtime-dispatch
//!
//! Message dispatch core for real-time game and chat servers.
//!
//! Clients speak a compact framed protocol: a 4-byte packet header, and inside
//! data packets a message envelope addressing a `Service.Method` route.
//! [`HandlerService`] decodes those packets, looks the route up in the
//! registry of components and runs the handler on a bounded worker pool, or
//! forwards the message to another server type through a [`RemoteService`].
//!
//! ## Layout
//! - [`core`]: packet framing, message envelope, body serializers
//! - [`protocol`]: routes and handshake payloads
//! - [`component`]: components, handler shapes and the registry
//! - [`session`]: per-connection state, session pool, heartbeat monitor
//! - [`service`]: the dispatcher and the remote seam
//! - [`config`], [`utils`]: configuration, logging, metrics, die signal
//!
//! ## Example
//! ```rust,no_run
//! use realtime_dispatch::component::{Component, HandlerProvider, Methods, RegisterOptions};
//! use realtime_dispatch::config::DispatchConfig;
//! use realtime_dispatch::{DieSignal, HandlerService};
//! use std::sync::Arc;
//!
//! struct Lobby;
//!
//! impl Component for Lobby {}
//!
//! impl HandlerProvider for Lobby {
//!     fn methods(self: Arc<Self>) -> Methods {
//!         Methods::new().request("Ping", |_session, _req| async { Ok(b"pong".to_vec()) })
//!     }
//! }
//!
//! # async fn run(stream: tokio::net::TcpStream) -> realtime_dispatch::Result<()> {
//! let config = DispatchConfig::from_env()?;
//! config.validate_strict()?;
//!
//! let mut service = HandlerService::new(
//!     DieSignal::new(),
//!     config.server(),
//!     None,
//!     config.handler_options()?,
//! );
//! service.register(Arc::new(Lobby), RegisterOptions::new())?;
//!
//! let service = Arc::new(service);
//! let handle = service.start()?;
//! service.handle_connection(stream).await?;
//! service.shutdown(handle).await;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod component;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;
pub mod utils;

pub use error::{ProtocolError, Result};
pub use service::{HandlerService, HandlerServiceOptions, RemoteService};
pub use utils::die::DieSignal;
