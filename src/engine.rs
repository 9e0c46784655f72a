//! Protocol engine composing codec, parser, and transaction table.
//!
//! The [`EngineBuilder`] wires a [`Transport`] to the streaming parser
//! and the transaction table, then [`ProtocolEngine`] exposes the two
//! outbound surfaces:
//! 1. `send` - non-blocking, handler fires exactly once with the
//!    response, a NAK, or a timeout
//! 2. `send_and_wait` - suspends the caller until the outcome arrives or
//!    the deadline passes
//!
//! Inbound bytes flow transport → `feed` → `extract` → classification:
//! ACK/NAK frames route by echoed sequence, data responses match by
//! `(ecu, command)`, semantically invalid but structurally intact frames
//! are answered with a NAK, and malformed byte runs are logged and
//! dropped.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vdplink::engine::ProtocolEngine;
//! use vdplink::protocol::{command, Frame};
//! use vdplink::transport::MockTransport;
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() -> vdplink::Result<()> {
//!     let transport = Arc::new(MockTransport::loopback());
//!     let engine = ProtocolEngine::builder(transport).connect("mock")?;
//!
//!     let request = Frame::new(0x01, command::READ_DATA, Bytes::new());
//!     let outcome = engine.send_and_wait(request, None).await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::{Result, VdpError};
use crate::protocol::{command, Frame, FrameBuffer, ParseOutcome, ResponseStatus};
use crate::transaction::{ResponseHandler, TransactionTable};
use crate::transport::Transport;

/// Sink for structurally valid data frames that match no pending request.
pub type UnsolicitedSink = Box<dyn Fn(Frame) + Send + Sync>;

/// Builder for configuring and connecting a [`ProtocolEngine`].
pub struct EngineBuilder {
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    unsolicited: Option<UnsolicitedSink>,
}

impl EngineBuilder {
    /// Create a builder around a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: EngineConfig::default(),
            unsolicited: None,
        }
    }

    /// Replace the default configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a sink for unsolicited data frames. Keep-alive frames
    /// are always dropped before reaching the sink.
    pub fn on_unsolicited<F>(mut self, sink: F) -> Self
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        self.unsolicited = Some(Box::new(sink));
        self
    }

    /// Initialize the transport, wire its callbacks into the engine, and
    /// start the background timeout sweeper when one is configured.
    ///
    /// A configured `sweep_interval` requires a running tokio runtime.
    pub fn connect(self, connection: &str) -> Result<ProtocolEngine> {
        self.transport.initialize(connection)?;

        let inner = Arc::new(EngineInner {
            parser: Mutex::new(FrameBuffer::with_max_buffered(self.config.max_buffered)),
            table: Mutex::new(TransactionTable::new()),
            transport: self.transport.clone(),
            config: self.config,
            unsolicited: self.unsolicited,
        });

        let weak = Arc::downgrade(&inner);
        self.transport.set_data_callback(Arc::new(move |bytes| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_bytes(bytes);
            }
        }));
        self.transport.set_error_callback(Arc::new(|error| {
            tracing::error!(error, "transport error");
        }));

        let sweeper = inner.config.sweep_interval.map(|period| {
            let weak = Arc::downgrade(&inner);
            tokio::spawn(sweep_loop(weak, period))
        });

        Ok(ProtocolEngine { inner, sweeper })
    }
}

/// Periodic timeout sweep; ends once the engine is dropped.
async fn sweep_loop(weak: Weak<EngineInner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match weak.upgrade() {
            Some(inner) => inner.sweep_expired(),
            None => break,
        }
    }
}

/// A connected protocol engine.
///
/// Safe to share across threads: `handle_bytes`, `send`, and the sweep
/// may run concurrently. The parser and the table sit behind separate
/// locks, acquired parser first; neither lock is held while response
/// handlers, the unsolicited sink, or the transport run.
pub struct ProtocolEngine {
    inner: Arc<EngineInner>,
    sweeper: Option<JoinHandle<()>>,
}

impl ProtocolEngine {
    /// Create an engine builder.
    pub fn builder(transport: Arc<dyn Transport>) -> EngineBuilder {
        EngineBuilder::new(transport)
    }

    /// Process raw bytes received from the transport.
    ///
    /// Normally invoked through the transport's data callback; exposed
    /// for hosts that pump bytes themselves. An empty slice still runs
    /// the timeout sweep.
    pub fn handle_bytes(&self, bytes: &[u8]) {
        self.inner.handle_bytes(bytes);
    }

    /// Send a request without blocking.
    ///
    /// Registers the handler, serializes the frame, and hands the bytes
    /// to the transport. The handler is invoked exactly once: with the
    /// matched response, an ACK, a NAK, or `Timeout` after `timeout`
    /// (the configured default when `None`). Returns the allocated
    /// sequence number.
    pub fn send<F>(&self, frame: Frame, handler: F, timeout: Option<Duration>) -> Result<u8>
    where
        F: FnOnce(ParseOutcome) + Send + 'static,
    {
        self.inner.send(frame, Box::new(handler), timeout)
    }

    /// Send a request and wait for its outcome.
    ///
    /// Suspends the caller until the handler fires or `timeout` elapses.
    /// On expiry the pending entry is removed before
    /// [`ParseOutcome::Timeout`] is returned, so a late response cannot
    /// reach a vanished waiter.
    pub async fn send_and_wait(
        &self,
        frame: Frame,
        timeout: Option<Duration>,
    ) -> Result<ParseOutcome> {
        let timeout = timeout.unwrap_or(self.inner.config.default_timeout);
        let (tx, rx) = oneshot::channel();

        let seq = self.inner.send(
            frame,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
            Some(timeout),
        )?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(VdpError::Closed),
            Err(_) => {
                self.inner.table.lock().unwrap().cancel(seq);
                Ok(ParseOutcome::Timeout)
            }
        }
    }

    /// Expire every pending request whose deadline has passed.
    pub fn check_timeouts(&self) {
        self.inner.sweep_expired();
    }

    /// Remove a pending request without invoking its handler.
    pub fn cancel(&self, seq: u8) -> bool {
        self.inner.table.lock().unwrap().cancel(seq)
    }

    /// Discard buffered, unclassified bytes and restart the parse
    /// session. Pending transactions are untouched and will still time
    /// out on their own deadlines.
    pub fn reset(&self) {
        self.inner.parser.lock().unwrap().reset();
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.table.lock().unwrap().len()
    }

    /// Check if the underlying transport is connected.
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Disconnect the underlying transport.
    pub fn disconnect(&self) {
        self.inner.transport.disconnect();
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

struct EngineInner {
    parser: Mutex<FrameBuffer>,
    table: Mutex<TransactionTable>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    unsolicited: Option<UnsolicitedSink>,
}

impl EngineInner {
    fn handle_bytes(&self, bytes: &[u8]) {
        self.sweep_expired();

        let outcomes = {
            let mut parser = self.parser.lock().unwrap();
            parser.feed(bytes);
            parser.extract()
        };

        for outcome in outcomes {
            match outcome {
                ParseOutcome::Success { frame, raw } => self.dispatch_frame(frame, raw),
                ParseOutcome::Invalid { defect, bytes } => {
                    tracing::warn!(%defect, dropped = bytes.len(), "dropping malformed input");
                }
                ParseOutcome::Incomplete { missing } => {
                    tracing::trace!(missing, "partial frame buffered");
                }
                // Synthesized by the transaction layer, never parsed.
                ParseOutcome::Timeout | ParseOutcome::Nack { .. } => {}
            }
        }
    }

    fn sweep_expired(&self) {
        let due = self.table.lock().unwrap().sweep(Instant::now());
        for handler in due {
            handler(ParseOutcome::Timeout);
        }
    }

    fn dispatch_frame(&self, frame: Frame, raw: Bytes) {
        if command::is_control(frame.command) {
            let routed = {
                let mut table = self.table.lock().unwrap();
                table.route_control(&frame, frame.is_ack())
            };
            if let Some((handler, outcome)) = routed {
                handler(outcome);
            }
            return;
        }

        if !command::is_known(frame.command) {
            tracing::debug!(
                command = frame.command,
                ecu = frame.ecu_id,
                "unknown command, answering with NAK"
            );
            self.emit_nak(&frame, ResponseStatus::InvalidCommand);
            return;
        }

        // Status 0x00 is a successful response; only the InvalidStatus
        // sentinel is rejected back to the peer.
        if frame.status_byte() == Some(ResponseStatus::InvalidStatus.as_u8()) {
            tracing::debug!(ecu = frame.ecu_id, "invalid response status, answering with NAK");
            self.emit_nak(&frame, ResponseStatus::InvalidStatus);
            return;
        }

        let handler = self.table.lock().unwrap().route_response(&frame);
        match handler {
            Some(handler) => handler(ParseOutcome::Success { frame, raw }),
            None => {
                if frame.is_keep_alive() {
                    tracing::trace!(ecu = frame.ecu_id, "dropping unsolicited keep-alive");
                } else if let Some(sink) = &self.unsolicited {
                    sink(frame);
                } else {
                    tracing::debug!(
                        ecu = frame.ecu_id,
                        command = frame.command,
                        "unsolicited frame with no sink registered"
                    );
                }
            }
        }
    }

    /// Answer a semantically invalid frame with a NAK echoing its
    /// command byte.
    fn emit_nak(&self, offending: &Frame, status: ResponseStatus) {
        let nak = Frame::nak(offending.request_ecu(), offending.command, status);
        match nak.serialize() {
            Ok(bytes) => {
                if let Err(error) = self.transport.send(&bytes) {
                    tracing::error!(%error, "failed to send NAK");
                }
            }
            Err(error) => tracing::error!(%error, "failed to serialize NAK"),
        }
    }

    fn send(
        &self,
        frame: Frame,
        handler: ResponseHandler,
        timeout: Option<Duration>,
    ) -> Result<u8> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let bytes = frame.serialize()?;

        let seq = self
            .table
            .lock()
            .unwrap()
            .register(frame, handler, timeout)?;

        if let Err(error) = self.transport.send(&bytes) {
            // The request never left; the entry must not fire later.
            self.table.lock().unwrap().cancel(seq);
            return Err(error);
        }
        Ok(seq)
    }
}
