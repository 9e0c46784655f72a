//! Parse outcomes and the wire-defect taxonomy.
//!
//! Every classification the codec or transaction layer makes is one
//! [`ParseOutcome`] variant. The parser never returns errors through a
//! separate channel; malformed input becomes `Invalid` entries in the
//! extraction sequence and the stream keeps flowing.

use bytes::Bytes;
use thiserror::Error;

use super::wire_format::ResponseStatus;
use super::Frame;

/// A specific wire-level defect found while classifying buffered bytes.
///
/// Each variant carries the numeric diagnostics for the failed check; the
/// bytes consumed by the defect travel separately in
/// [`ParseOutcome::Invalid`] so that no input byte is ever reported twice.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameDefect {
    /// Length field outside the valid range of 6 to 253.
    #[error("invalid frame length: {len}")]
    BadLength {
        /// The declared length byte.
        len: u8,
    },

    /// The byte at the declared end position is not the end sentinel.
    #[error("end sentinel missing: found {found:#04x}")]
    BadEnd {
        /// The byte found where 0x7F was expected.
        found: u8,
    },

    /// XOR parity disagreement over the frame body.
    #[error("checksum mismatch: wire {expected:#04x}, computed {computed:#04x}")]
    BadChecksum {
        /// The checksum byte carried on the wire.
        expected: u8,
        /// The checksum computed over the received body.
        computed: u8,
    },

    /// Bytes discarded while scanning for a start sentinel mid-session.
    #[error("{dropped} byte(s) discarded before start sentinel")]
    GarbageBeforeStart {
        /// How many bytes were skipped.
        dropped: usize,
    },
}

/// One classification produced by the codec or the transaction layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A complete, validated frame together with its original wire bytes.
    Success {
        /// The decoded logical frame.
        frame: Frame,
        /// The exact bytes the frame occupied on the wire. Empty for
        /// outcomes synthesized by the transaction layer.
        raw: Bytes,
    },

    /// The buffer holds a plausible frame prefix; more bytes are needed.
    Incomplete {
        /// How many further bytes would complete the frame. Advisory.
        missing: usize,
    },

    /// A specific defect, together with the bytes it consumed.
    Invalid {
        /// What failed.
        defect: FrameDefect,
        /// The input bytes this classification consumed.
        bytes: Bytes,
    },

    /// A registered request expired. Surfaced only through the
    /// transaction layer, never by the parser.
    Timeout,

    /// The peer answered with a negative acknowledgment.
    Nack {
        /// Reason decoded from the NAK's second data byte, or
        /// [`ResponseStatus::GeneralError`] when absent.
        reason: ResponseStatus,
        /// The NAK frame itself.
        frame: Frame,
    },
}

impl ParseOutcome {
    /// True for `Success`.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The contained frame, if this outcome carries one.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Self::Success { frame, .. } | Self::Nack { frame, .. } => Some(frame),
            _ => None,
        }
    }
}
