//! Transaction table mapping outstanding requests to response handlers.
//!
//! Requests are keyed by an 8-bit sequence number that wraps, so at most
//! 255 requests can be outstanding at once. Data-frame responses carry no
//! sequence on the wire and are matched by `(ecu, command)` instead;
//! ACK/NAK control frames echo the sequence in their first data byte.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{Result, VdpError};
use crate::protocol::{Frame, ParseOutcome, ResponseStatus};

/// Handler invoked exactly once with the final outcome of a request:
/// a matched response, an ACK, a NAK, or a timeout.
pub type ResponseHandler = Box<dyn FnOnce(ParseOutcome) + Send + 'static>;

/// An outstanding request awaiting its response.
struct PendingEntry {
    /// The frame that was sent, used for response matching.
    request: Frame,
    /// Consumed when the entry completes. Ownership by the table is what
    /// makes the call-exactly-once contract structural.
    handler: ResponseHandler,
    /// Monotonic completion deadline.
    deadline: Instant,
}

/// Table of pending requests with deadline sweeping.
///
/// Not internally synchronized; the engine serializes access behind its
/// own lock and invokes returned handlers only after releasing it.
pub struct TransactionTable {
    entries: HashMap<u8, PendingEntry>,
    /// Last allocated sequence number; allocation probes upward from here.
    last_seq: u8,
}

impl TransactionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_seq: 0,
        }
    }

    /// Number of live pending requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether `seq` currently has a live entry.
    pub fn contains(&self, seq: u8) -> bool {
        self.entries.contains_key(&seq)
    }

    /// Register an outstanding request.
    ///
    /// Allocates the next free sequence number (wrapping at 255) and
    /// stores the entry with `deadline = now + timeout`. Fails with
    /// [`VdpError::TableFull`] when every sequence number is live.
    pub fn register(
        &mut self,
        request: Frame,
        handler: ResponseHandler,
        timeout: Duration,
    ) -> Result<u8> {
        if self.entries.len() >= 256 {
            return Err(VdpError::TableFull);
        }

        let mut seq = self.last_seq.wrapping_add(1);
        while self.entries.contains_key(&seq) {
            seq = seq.wrapping_add(1);
        }
        self.last_seq = seq;

        self.entries.insert(
            seq,
            PendingEntry {
                request,
                handler,
                deadline: Instant::now() + timeout,
            },
        );
        Ok(seq)
    }

    /// Match a non-control frame against the pending requests.
    ///
    /// A response matches when its command equals the request's command
    /// and its ECU id, response bit stripped, equals the request's ECU
    /// id. The wire format carries no sequence in data frames, so two
    /// outstanding requests with the same `(ecu, command)` key cannot be
    /// told apart; the oldest deadline wins.
    ///
    /// Returns the handler to invoke, or `None` when the frame is
    /// unsolicited.
    pub fn route_response(&mut self, response: &Frame) -> Option<ResponseHandler> {
        let seq = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.request.command == response.command
                    && entry.request.ecu_id == response.request_ecu()
            })
            .min_by_key(|(_, entry)| entry.deadline)
            .map(|(&seq, _)| seq)?;

        self.entries.remove(&seq).map(|entry| entry.handler)
    }

    /// Route an ACK or NAK control frame.
    ///
    /// Control frames carry the sequence they refer to in `data[0]`; a
    /// control frame without it is malformed and dropped. Returns the
    /// handler together with the outcome to deliver: `Success` for an
    /// ACK, `Nack` with the reason from `data[1]` (or `GeneralError`
    /// when absent) for a NAK.
    pub fn route_control(
        &mut self,
        control: &Frame,
        is_ack: bool,
    ) -> Option<(ResponseHandler, ParseOutcome)> {
        let seq = match control.data.first() {
            Some(&seq) => seq,
            None => {
                tracing::warn!(
                    ecu = control.ecu_id,
                    "control frame without sequence byte, dropping"
                );
                return None;
            }
        };

        let entry = match self.entries.remove(&seq) {
            Some(entry) => entry,
            None => {
                tracing::debug!(seq, "control frame for unknown sequence, dropping");
                return None;
            }
        };

        let outcome = if is_ack {
            ParseOutcome::Success {
                frame: control.clone(),
                raw: Bytes::new(),
            }
        } else {
            let reason = control
                .data
                .get(1)
                .and_then(|&b| ResponseStatus::from_wire(b))
                .unwrap_or(ResponseStatus::GeneralError);
            ParseOutcome::Nack {
                reason,
                frame: control.clone(),
            }
        };

        Some((entry.handler, outcome))
    }

    /// Remove every entry whose deadline has elapsed.
    ///
    /// Returns the expired handlers; the caller invokes each with a
    /// `Timeout` outcome outside any lock.
    pub fn sweep(&mut self, now: Instant) -> Vec<ResponseHandler> {
        let expired: Vec<u8> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(&seq, _)| seq)
            .collect();

        expired
            .into_iter()
            .filter_map(|seq| self.entries.remove(&seq))
            .map(|entry| entry.handler)
            .collect()
    }

    /// Remove a pending entry without invoking its handler.
    ///
    /// Used when a blocking waiter gives up on its own deadline.
    pub fn cancel(&mut self, seq: u8) -> bool {
        self.entries.remove(&seq).is_some()
    }
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}
