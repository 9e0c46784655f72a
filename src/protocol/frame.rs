//! Logical frame with typed accessors and the wire serializer.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing between the parser,
//! the transaction table, and response handlers.
//!
//! # Example
//!
//! ```
//! use vdplink::protocol::{command, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(0x01, command::READ_DATA, Bytes::from_static(&[0x12]));
//! let wire = frame.serialize().unwrap();
//!
//! assert_eq!(wire[0], 0x7E);
//! assert_eq!(wire[1] as usize, wire.len());
//! assert_eq!(*wire.last().unwrap(), 0x7F);
//! ```

use bytes::Bytes;

use super::wire_format::{
    checksum, command, ResponseStatus, END_BYTE, MAX_DATA_LEN, MIN_FRAME_LEN, RESPONSE_ECU_MASK,
    START_BYTE,
};
use crate::error::{Result, VdpError};

/// One protocol data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Target ECU identifier. The high bit marks a response frame.
    pub ecu_id: u8,
    /// Command code, see [`command`].
    pub command: u8,
    /// Command-specific payload, 0 to 247 bytes.
    pub data: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(ecu_id: u8, command: u8, data: Bytes) -> Self {
        Self {
            ecu_id,
            command,
            data,
        }
    }

    /// Create a frame copying the payload from a slice.
    pub fn from_parts(ecu_id: u8, command: u8, data: &[u8]) -> Self {
        Self {
            ecu_id,
            command,
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Decode a frame from a window that [`verify_window`] has accepted.
    ///
    /// [`verify_window`]: super::wire_format::verify_window
    pub(crate) fn from_window(window: &Bytes) -> Self {
        let len = window.len();
        Self {
            ecu_id: window[2],
            command: window[3],
            data: window.slice(4..len - 2),
        }
    }

    /// Build the acknowledgment for the request registered under `seq`.
    pub fn ack(ecu_id: u8, seq: u8) -> Self {
        Self {
            ecu_id,
            command: command::ACKNOWLEDGE,
            data: Bytes::copy_from_slice(&[seq]),
        }
    }

    /// Build a negative acknowledgment. `echo` is the byte the NAK refers
    /// to (a sequence number toward a requester, a command byte toward a
    /// misbehaving peer); `status` names the reason.
    pub fn nak(ecu_id: u8, echo: u8, status: ResponseStatus) -> Self {
        Self {
            ecu_id,
            command: command::NEGATIVE_ACK,
            data: Bytes::copy_from_slice(&[echo, status.as_u8()]),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the payload length.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Check if the response bit is set on the ECU id.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.ecu_id & RESPONSE_ECU_MASK != 0
    }

    /// The ECU id with the response bit stripped.
    #[inline]
    pub fn request_ecu(&self) -> u8 {
        self.ecu_id & !RESPONSE_ECU_MASK
    }

    /// Check if this is a positive acknowledgment control frame.
    #[inline]
    pub fn is_ack(&self) -> bool {
        self.command == command::ACKNOWLEDGE
    }

    /// Check if this is a negative acknowledgment control frame.
    #[inline]
    pub fn is_nak(&self) -> bool {
        self.command == command::NEGATIVE_ACK
    }

    /// Check if this is keep-alive traffic.
    #[inline]
    pub fn is_keep_alive(&self) -> bool {
        self.command == command::KEEP_ALIVE
    }

    /// The status byte of a response frame, if present.
    pub fn status_byte(&self) -> Option<u8> {
        if self.is_response() {
            self.data.first().copied()
        } else {
            None
        }
    }

    /// Serialize to wire bytes.
    ///
    /// Emits `data_len + 6` bytes. Fails with
    /// [`VdpError::PayloadTooLarge`] when the payload exceeds 247 bytes;
    /// otherwise this cannot fail and allocates only the output buffer.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let n = self.data.len();
        if n > MAX_DATA_LEN {
            return Err(VdpError::PayloadTooLarge(n));
        }

        let total = n + MIN_FRAME_LEN;
        let mut out = Vec::with_capacity(total);
        out.push(START_BYTE);
        out.push(total as u8);
        out.push(self.ecu_id);
        out.push(self.command);
        out.extend_from_slice(&self.data);
        out.push(checksum(&out[1..]));
        out.push(END_BYTE);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::verify_window;

    #[test]
    fn test_serialize_empty_payload() {
        let frame = Frame::new(0x81, command::READ_DATA, Bytes::new());
        let wire = frame.serialize().unwrap();

        assert_eq!(wire, vec![0x7E, 0x06, 0x81, 0x10, 0x97, 0x7F]);
    }

    #[test]
    fn test_serialize_with_payload() {
        let frame = Frame::from_parts(0x82, command::WRITE_DATA, &[0x12, 0x34, 0x56]);
        let wire = frame.serialize().unwrap();

        assert_eq!(wire.len(), 9);
        assert_eq!(wire[0], START_BYTE);
        assert_eq!(wire[1], 9);
        assert_eq!(wire[2], 0x82);
        assert_eq!(wire[3], 0x20);
        assert_eq!(&wire[4..7], &[0x12, 0x34, 0x56]);
        assert_eq!(wire[7], checksum(&wire[1..7]));
        assert_eq!(wire[8], END_BYTE);
        assert!(verify_window(&wire).is_ok());
    }

    #[test]
    fn test_serialize_max_payload() {
        let frame = Frame::new(0x01, command::WRITE_DATA, Bytes::from(vec![0xAA; MAX_DATA_LEN]));
        let wire = frame.serialize().unwrap();

        assert_eq!(wire.len(), 253);
        assert_eq!(wire[1], 253);
        assert!(verify_window(&wire).is_ok());
    }

    #[test]
    fn test_serialize_payload_too_large() {
        let frame = Frame::new(0x01, command::WRITE_DATA, Bytes::from(vec![0; MAX_DATA_LEN + 1]));
        assert!(matches!(
            frame.serialize(),
            Err(VdpError::PayloadTooLarge(248))
        ));
    }

    #[test]
    fn test_sentinel_bytes_in_payload_are_not_escaped() {
        let frame = Frame::from_parts(0x01, command::WRITE_DATA, &[0x7E, 0x7F, 0x7E]);
        let wire = frame.serialize().unwrap();

        assert_eq!(&wire[4..7], &[0x7E, 0x7F, 0x7E]);
        assert!(verify_window(&wire).is_ok());
    }

    #[test]
    fn test_response_bit_accessors() {
        let request = Frame::new(0x01, command::READ_DATA, Bytes::new());
        assert!(!request.is_response());
        assert_eq!(request.request_ecu(), 0x01);
        assert_eq!(request.status_byte(), None);

        let response = Frame::from_parts(0x81, command::READ_DATA, &[0x00, 0x42]);
        assert!(response.is_response());
        assert_eq!(response.request_ecu(), 0x01);
        assert_eq!(response.status_byte(), Some(0x00));
    }

    #[test]
    fn test_control_frame_constructors() {
        let ack = Frame::ack(0x01, 7);
        assert!(ack.is_ack());
        assert_eq!(ack.data(), &[7]);

        let nak = Frame::nak(0x01, command::READ_DATA, ResponseStatus::InvalidCommand);
        assert!(nak.is_nak());
        assert_eq!(nak.data(), &[0x10, 0x01]);
    }

    #[test]
    fn test_keep_alive_detection() {
        assert!(Frame::new(0x00, command::KEEP_ALIVE, Bytes::new()).is_keep_alive());
        assert!(!Frame::new(0x01, command::READ_DATA, Bytes::new()).is_keep_alive());
    }

    #[test]
    fn test_from_window() {
        let wire = Frame::from_parts(0x82, command::WRITE_DATA, &[0x12, 0x34, 0x56])
            .serialize()
            .unwrap();
        let window = Bytes::from(wire);

        let frame = Frame::from_window(&window);
        assert_eq!(frame.ecu_id, 0x82);
        assert_eq!(frame.command, command::WRITE_DATA);
        assert_eq!(frame.data(), &[0x12, 0x34, 0x56]);
    }
}
