//! Wire format constants and frame window verification.
//!
//! Implements the VDP frame layout:
//! ```text
//! ┌───────┬─────┬────────┬─────┬────────────┬──────────┬───────┐
//! │ START │ LEN │ ECU_ID │ CMD │ DATA[0..n] │ CHECKSUM │  END  │
//! │ 0x7E  │     │        │     │            │          │ 0x7F  │
//! └───────┴─────┴────────┴─────┴────────────┴──────────┴───────┘
//! ```
//!
//! `LEN` counts every byte of the frame including both sentinels, so a
//! dataless frame has `LEN = 6`. `CHECKSUM` is the XOR of all bytes
//! strictly between `START` and `CHECKSUM` itself. Sentinels are not
//! escaped in payload; resynchronization is the parser's job.

use super::outcome::FrameDefect;

/// Start-of-frame sentinel.
pub const START_BYTE: u8 = 0x7E;

/// End-of-frame sentinel.
pub const END_BYTE: u8 = 0x7F;

/// Minimum frame length: sentinels, length, ECU id, command, checksum.
pub const MIN_FRAME_LEN: usize = 6;

/// Maximum frame length including both sentinels.
pub const MAX_FRAME_LEN: usize = 253;

/// Maximum payload bytes a single frame can carry.
pub const MAX_DATA_LEN: usize = MAX_FRAME_LEN - MIN_FRAME_LEN;

/// Bit set in `ecu_id` to mark a response frame (ECU `n` answers as `n | 0x80`).
pub const RESPONSE_ECU_MASK: u8 = 0x80;

/// ECU id reserved for keep-alive traffic.
pub const KEEP_ALIVE_ECU: u8 = 0x00;

/// Command codes for the protocol.
pub mod command {
    /// Read diagnostic data.
    pub const READ_DATA: u8 = 0x10;
    /// Write configuration data.
    pub const WRITE_DATA: u8 = 0x20;
    /// Clear stored error codes.
    pub const CLEAR_CODES: u8 = 0x30;
    /// Reset the target ECU.
    pub const ECU_RESET: u8 = 0x40;
    /// Maintain the connection.
    pub const KEEP_ALIVE: u8 = 0x50;
    /// Positive acknowledgment (control).
    pub const ACKNOWLEDGE: u8 = 0x06;
    /// Negative acknowledgment (control).
    pub const NEGATIVE_ACK: u8 = 0x15;

    /// Check whether a command byte belongs to the protocol's command set.
    #[inline]
    pub fn is_known(cmd: u8) -> bool {
        matches!(
            cmd,
            READ_DATA | WRITE_DATA | CLEAR_CODES | ECU_RESET | KEEP_ALIVE | ACKNOWLEDGE
                | NEGATIVE_ACK
        )
    }

    /// Check whether a command byte is a control command (ACK or NAK).
    #[inline]
    pub fn is_control(cmd: u8) -> bool {
        matches!(cmd, ACKNOWLEDGE | NEGATIVE_ACK)
    }
}

/// Status codes carried in the first data byte of response frames and in
/// the second data byte of NAK frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    /// Operation completed.
    Success = 0x00,
    /// Command not recognized by the peer.
    InvalidCommand = 0x01,
    /// Command data rejected by the peer.
    InvalidData = 0x02,
    /// ECU cannot service the request right now.
    EcuBusy = 0x03,
    /// Peer sent a status code outside the recognized set.
    InvalidStatus = 0x80,
    /// Request deadline elapsed. Synthesized locally, never on the wire.
    Timeout = 0xFE,
    /// Unspecified failure.
    GeneralError = 0xFF,
}

impl ResponseStatus {
    /// Decode a wire status byte. Returns `None` for unrecognized codes.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::InvalidCommand),
            0x02 => Some(Self::InvalidData),
            0x03 => Some(Self::EcuBusy),
            0x80 => Some(Self::InvalidStatus),
            0xFE => Some(Self::Timeout),
            0xFF => Some(Self::GeneralError),
            _ => None,
        }
    }

    /// The wire representation of this status.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// XOR parity over a byte slice.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Verify a byte window presumed to hold one complete frame.
///
/// The window must start at a `START_BYTE` the caller already located;
/// everything else is checked here: the declared length matches the
/// window, the end sentinel is in place, and the checksum agrees.
///
/// Both this function and the serializer in
/// [`Frame::serialize`](super::Frame::serialize) are pure; neither
/// allocates.
pub fn verify_window(window: &[u8]) -> Result<(), FrameDefect> {
    let len = window.len();
    debug_assert!(len >= 2, "caller must supply at least START and LEN");
    debug_assert_eq!(window[0], START_BYTE, "caller must align on START_BYTE");

    let declared = window[1] as usize;
    if declared != len || !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&declared) {
        return Err(FrameDefect::BadLength { len: window[1] });
    }

    let last = window[len - 1];
    if last != END_BYTE {
        return Err(FrameDefect::BadEnd { found: last });
    }

    let computed = checksum(&window[1..len - 2]);
    let expected = window[len - 2];
    if computed != expected {
        return Err(FrameDefect::BadChecksum { expected, computed });
    }

    Ok(())
}
