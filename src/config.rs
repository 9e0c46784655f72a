//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::wire_format::MAX_FRAME_LEN;

/// Default timeout applied to requests sent without an explicit deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Default cap on buffered, not-yet-classified bytes in the parser.
pub const DEFAULT_MAX_BUFFERED: usize = 16 * MAX_FRAME_LEN;

/// Configuration for [`ProtocolEngine`](crate::engine::ProtocolEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for requests sent with `timeout = None`.
    pub default_timeout: Duration,
    /// Maximum bytes the streaming parser may hold. Oldest bytes are
    /// trimmed above this cap so a hostile stream cannot grow the buffer
    /// without bound.
    pub max_buffered: usize,
    /// Interval for the background timeout sweep. `None` disables the
    /// sweeper task; timeouts then fire only when bytes are processed or
    /// [`check_timeouts`](crate::engine::ProtocolEngine::check_timeouts)
    /// is called.
    pub sweep_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_buffered: DEFAULT_MAX_BUFFERED,
            sweep_interval: None,
        }
    }
}
