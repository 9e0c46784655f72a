//! Transport module - pluggable byte channels under the engine.
//!
//! The engine does not care how bytes move; anything that can push
//! received bytes into a callback and accept outbound byte slices can
//! carry the protocol. Hardware adapters (serial, CAN, Bluetooth) live
//! outside this crate and implement [`Transport`]; the built-in
//! [`MockTransport`] loops bytes back for tests.

use std::sync::Arc;

use crate::error::Result;

mod mock;

pub use mock::MockTransport;

/// Callback invoked with bytes received from the peer.
pub type DataCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callback invoked with transport-level error descriptions.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A bidirectional byte channel.
///
/// Implementations deliver inbound bytes through the registered
/// [`DataCallback`] and accept outbound bytes via [`send`](Self::send).
/// `send` must be non-blocking or bounded by the transport. The data
/// callback must never call back into the engine API that triggered a
/// send on the same thread; delivery from a different thread is fine.
pub trait Transport: Send + Sync {
    /// Open the channel using a transport-specific connection string.
    fn initialize(&self, connection: &str) -> Result<()>;

    /// Transmit raw bytes to the peer.
    fn send(&self, data: &[u8]) -> Result<()>;

    /// Register the sink for received bytes.
    fn set_data_callback(&self, callback: DataCallback);

    /// Register the sink for transport errors.
    fn set_error_callback(&self, callback: ErrorCallback);

    /// Check if the channel is open and usable.
    fn is_connected(&self) -> bool;

    /// Close the channel and release resources.
    fn disconnect(&self);

    /// The most recent error description, if any.
    fn last_error(&self) -> Option<String>;
}
