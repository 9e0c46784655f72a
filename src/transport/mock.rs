//! In-memory transport for tests.
//!
//! Records every outbound buffer and can answer sends three ways:
//! - **loopback**: the sent bytes are replayed into the data callback,
//!   so the engine talks to itself
//! - **scripted**: queued response buffers are delivered one per send,
//!   simulating a peer
//! - **failing**: every send returns a transport error, simulating a
//!   broken bus
//!
//! Bytes can also be injected directly to simulate unsolicited traffic.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{DataCallback, ErrorCallback, Transport};
use crate::error::{Result, VdpError};

#[derive(Default)]
struct MockState {
    connected: bool,
    data_callback: Option<DataCallback>,
    error_callback: Option<ErrorCallback>,
    sent: Vec<Vec<u8>>,
    scripted: VecDeque<Vec<u8>>,
    loopback: bool,
    send_failure: Option<String>,
    last_error: Option<String>,
}

/// Loopback transport matching the [`Transport`] contract.
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Create a mock that only records sends.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Create a mock that echoes every sent buffer back into the data
    /// callback.
    pub fn loopback() -> Self {
        let mock = Self::new();
        mock.state.lock().unwrap().loopback = true;
        mock
    }

    /// Queue a response buffer to be delivered after the next send.
    /// Scripted responses take precedence over loopback.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.state.lock().unwrap().scripted.push_back(bytes.to_vec());
    }

    /// Make every subsequent send fail with a transport error carrying
    /// `reason`. Nothing is recorded or delivered for failed sends.
    pub fn fail_sends(&self, reason: &str) {
        self.state.lock().unwrap().send_failure = Some(reason.to_string());
    }

    /// Deliver bytes to the data callback as if the peer sent them.
    pub fn inject(&self, bytes: &[u8]) {
        let callback = self.state.lock().unwrap().data_callback.clone();
        if let Some(callback) = callback {
            callback(bytes);
        }
    }

    /// Report an error through the error callback and remember it.
    pub fn inject_error(&self, error: &str) {
        let callback = {
            let mut state = self.state.lock().unwrap();
            state.last_error = Some(error.to_string());
            state.error_callback.clone()
        };
        if let Some(callback) = callback {
            callback(error);
        }
    }

    /// Every buffer passed to [`Transport::send`] so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Drain the record of sent buffers.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().unwrap().sent)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn initialize(&self, _connection: &str) -> Result<()> {
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    fn send(&self, data: &[u8]) -> Result<()> {
        // Decide the reply while holding the lock, deliver after
        // releasing it: the callback may re-enter this transport.
        let (callback, reply) = {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                state.last_error = Some("send on disconnected transport".to_string());
                return Err(VdpError::NotConnected);
            }
            if let Some(reason) = state.send_failure.clone() {
                state.last_error = Some(reason.clone());
                return Err(VdpError::Transport(reason));
            }
            state.sent.push(data.to_vec());

            let reply = if let Some(scripted) = state.scripted.pop_front() {
                Some(scripted)
            } else if state.loopback {
                Some(data.to_vec())
            } else {
                None
            };
            (state.data_callback.clone(), reply)
        };

        if let (Some(callback), Some(reply)) = (callback, reply) {
            callback(&reply);
        }
        Ok(())
    }

    fn set_data_callback(&self, callback: DataCallback) {
        self.state.lock().unwrap().data_callback = Some(callback);
    }

    fn set_error_callback(&self, callback: ErrorCallback) {
        self.state.lock().unwrap().error_callback = Some(callback);
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.data_callback = None;
        state.error_callback = None;
    }

    fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }
}
