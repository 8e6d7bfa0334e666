//! # Services
//!
//! - **Handler**: the dispatcher that turns packets into handler calls
//! - **Remote**: the seam towards other server types

pub mod handler;
pub mod remote;

pub use handler::{DispatchHandle, HandlerService, HandlerServiceOptions};
pub use remote::{LoopbackRemoteService, RemoteService};
