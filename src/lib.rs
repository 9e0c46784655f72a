//! # vdplink
//!
//! Streaming codec and transaction engine for the Vehicle Diagnostic
//! Protocol (VDP), a sentinel-framed request/response protocol for
//! talking to ECUs.
//!
//! ## Architecture
//!
//! - **Frame codec** ([`protocol::wire_format`], [`protocol::Frame`]):
//!   pure serialization and window verification
//! - **Streaming parser** ([`protocol::FrameBuffer`]): accumulates
//!   arbitrarily fragmented input and drains typed
//!   [`ParseOutcome`](protocol::ParseOutcome)s, resynchronizing after
//!   corruption without ever losing the stream
//! - **Transaction table** ([`transaction::TransactionTable`]): pending
//!   requests keyed by wrapping 8-bit sequence, matched against
//!   responses and expired on monotonic deadlines
//! - **Protocol engine** ([`engine::ProtocolEngine`]): glues the layers
//!   to a [`Transport`](transport::Transport) and exposes callback-based
//!   and awaitable send surfaces
//!
//! The wire format is `START(0x7E) | LEN | ECU_ID | CMD | DATA |
//! CHECKSUM | END(0x7F)` with unescaped sentinels; tolerance to payload
//! bytes colliding with the sentinels is the parser's central concern.
//!
//! ## Example
//!
//! ```
//! use vdplink::protocol::{command, Frame, FrameBuffer};
//! use bytes::Bytes;
//!
//! let request = Frame::new(0x01, command::READ_DATA, Bytes::from_static(&[0x42]));
//! let wire = request.serialize().unwrap();
//!
//! let mut parser = FrameBuffer::new();
//! parser.feed(&wire);
//! let outcomes = parser.extract();
//!
//! assert_eq!(outcomes.len(), 1);
//! assert_eq!(outcomes[0].frame(), Some(&request));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod transaction;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, ProtocolEngine};
pub use error::{Result, VdpError};
pub use protocol::{command, Frame, FrameBuffer, FrameDefect, ParseOutcome, ResponseStatus};
pub use transaction::TransactionTable;
pub use transport::{MockTransport, Transport};
