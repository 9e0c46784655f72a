//! Streaming frame buffer for accumulating fragmented input.
//!
//! Uses `bytes::BytesMut` for the accumulation buffer and hands out
//! zero-copy `Bytes` windows for every classified region. Callers `feed`
//! chunks of any size, then `extract` drains every classification the
//! buffered bytes admit.
//!
//! # Resynchronization
//!
//! Payload bytes may collide with the sentinels, so a bad length, end
//! byte, or checksum never advances the cursor by the declared length:
//! only the suspect start sentinel is discarded and the scan resumes.
//! That single rule guarantees the parser can never desynchronize
//! permanently; a well-formed frame anywhere in the stream is eventually
//! found.
//!
//! # Example
//!
//! ```
//! use vdplink::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! buffer.feed(&[0x7E, 0x06, 0x81, 0x10, 0x97, 0x7F]);
//!
//! let outcomes = buffer.extract();
//! assert_eq!(outcomes.len(), 1);
//! assert!(outcomes[0].is_success());
//! ```

use bytes::{Bytes, BytesMut};

use super::outcome::{FrameDefect, ParseOutcome};
use super::wire_format::{verify_window, MAX_FRAME_LEN, MIN_FRAME_LEN, START_BYTE};
use super::Frame;
use crate::config::DEFAULT_MAX_BUFFERED;

/// Buffer for accumulating incoming bytes and extracting classifications.
///
/// Stateful across `feed` calls: a frame split over any number of chunks
/// completes once its last byte arrives, with no loss and no spurious
/// `Invalid` verdicts in between.
pub struct FrameBuffer {
    /// Accumulated bytes not yet classified.
    buffer: BytesMut,
    /// Cap on `buffer`; oldest bytes are trimmed above it.
    max_buffered: usize,
    /// Whether this session has produced at least one validated frame.
    /// Gates the garbage report: pre-sentinel bytes are discarded
    /// silently until the stream has proven itself once.
    saw_valid_frame: bool,
    /// Set by `feed`, cleared when a trailing `Incomplete` is reported,
    /// so repeated `extract` calls do not repeat the hint.
    fed_since_hint: bool,
}

impl FrameBuffer {
    /// Create a frame buffer with the default byte cap.
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED)
    }

    /// Create a frame buffer with a custom byte cap.
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN),
            max_buffered,
            saw_valid_frame: false,
            fed_since_hint: false,
        }
    }

    /// Append raw bytes. Never fails and never parses.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.fed_since_hint = true;

        if self.buffer.len() > self.max_buffered {
            let excess = self.buffer.len() - self.max_buffered;
            let _ = self.buffer.split_to(excess);
            tracing::warn!(dropped = excess, "frame buffer over capacity, trimming oldest bytes");
        }
    }

    /// Drain every classification the buffered bytes admit.
    ///
    /// Outcomes are ordered by where their first byte appeared in the
    /// input. The call leaves behind only bytes that cannot be classified
    /// yet; calling again without feeding returns nothing new.
    pub fn extract(&mut self) -> Vec<ParseOutcome> {
        let mut outcomes = Vec::new();

        loop {
            // Scan to the next start sentinel, dropping whatever precedes it.
            match self.buffer.iter().position(|&b| b == START_BYTE) {
                Some(0) => {}
                Some(n) => {
                    let junk = self.buffer.split_to(n).freeze();
                    self.report_garbage(junk, &mut outcomes);
                }
                None => {
                    if !self.buffer.is_empty() {
                        let junk = self.buffer.split_to(self.buffer.len()).freeze();
                        self.report_garbage(junk, &mut outcomes);
                    }
                    break;
                }
            }

            if self.buffer.len() < 2 {
                break;
            }

            let declared = self.buffer[1] as usize;
            if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&declared) {
                // The length field itself is suspect: drop only the start
                // sentinel and rescan, never skip by `declared`.
                let bytes = self.buffer.split_to(1).freeze();
                outcomes.push(ParseOutcome::Invalid {
                    defect: FrameDefect::BadLength {
                        len: declared as u8,
                    },
                    bytes,
                });
                continue;
            }

            if self.buffer.len() < declared {
                break;
            }

            if let Err(defect) = verify_window(&self.buffer[..declared]) {
                let bytes = self.buffer.split_to(1).freeze();
                outcomes.push(ParseOutcome::Invalid { defect, bytes });
                continue;
            }

            let raw = self.buffer.split_to(declared).freeze();
            let frame = Frame::from_window(&raw);
            self.saw_valid_frame = true;
            outcomes.push(ParseOutcome::Success { frame, raw });
        }

        // One trailing hint per fed buffer state when a plausible frame
        // prefix is waiting on more bytes.
        if self.fed_since_hint && self.buffer.len() >= 2 {
            let declared = self.buffer[1] as usize;
            if (MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&declared) && self.buffer.len() < declared {
                outcomes.push(ParseOutcome::Incomplete {
                    missing: declared - self.buffer.len(),
                });
                self.fed_since_hint = false;
            }
        }

        outcomes
    }

    /// Clear the buffer and start a new session.
    ///
    /// Pending transactions registered elsewhere are untouched; this only
    /// discards unclassified bytes and re-arms the startup-garbage grace.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.saw_valid_frame = false;
        self.fed_since_hint = false;
    }

    /// Number of buffered, not-yet-classified bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn report_garbage(&self, junk: Bytes, outcomes: &mut Vec<ParseOutcome>) {
        if self.saw_valid_frame {
            outcomes.push(ParseOutcome::Invalid {
                defect: FrameDefect::GarbageBeforeStart { dropped: junk.len() },
                bytes: junk,
            });
        } else {
            tracing::debug!(
                dropped = junk.len(),
                "discarding startup bytes before first start sentinel"
            );
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
