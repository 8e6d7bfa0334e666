//! # Utility Modules
//!
//! Supporting utilities shared by the dispatcher and the session layer.
//!
//! ## Components
//! - **Compression**: LZ4 and Zstd for message data, with output size limits
//! - **Die**: Process-wide shutdown signal
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe dispatch counters
//! - **Guard**: Converts handler panics into error results
//! - **Timeout**: Default timings

pub mod compression;
pub mod die;
pub mod guard;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use die::{DieListener, DieSignal};
