//! Protocol module - wire format, framing, and streaming extraction.
//!
//! This module implements the byte-level VDP codec:
//! - Frame layout constants, checksum, and window verification
//! - The logical [`Frame`] with its serializer
//! - [`FrameBuffer`] for accumulating fragmented input and draining
//!   classified [`ParseOutcome`]s

mod frame;
mod frame_buffer;
mod outcome;
pub mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use outcome::{FrameDefect, ParseOutcome};
pub use wire_format::{
    checksum, command, verify_window, ResponseStatus, END_BYTE, KEEP_ALIVE_ECU, MAX_DATA_LEN,
    MAX_FRAME_LEN, MIN_FRAME_LEN, RESPONSE_ECU_MASK, START_BYTE,
};
