//! Error types for vdplink.

use thiserror::Error;

/// Main error type for all vdplink operations.
///
/// Wire-level defects found while parsing are not errors: they surface as
/// [`ParseOutcome::Invalid`](crate::protocol::ParseOutcome) values in the
/// extraction sequence. `VdpError` covers failures of the API surface
/// itself (serializing, registering, transmitting).
#[derive(Debug, Error)]
pub enum VdpError {
    /// Frame payload exceeds the wire format's capacity (247 bytes).
    #[error("payload length {0} exceeds maximum of 247 bytes")]
    PayloadTooLarge(usize),

    /// All 256 sequence numbers have live pending requests.
    #[error("transaction table is full")]
    TableFull,

    /// The transport rejected or failed an operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation requires a connected transport.
    #[error("transport is not connected")]
    NotConnected,

    /// The engine was dropped while a request was outstanding.
    #[error("engine shut down")]
    Closed,
}

/// Result type alias using VdpError.
pub type Result<T> = std::result::Result<T, VdpError>;
