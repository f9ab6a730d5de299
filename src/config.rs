//! Session layer tunables.

use std::time::Duration;

/// Configuration for an [`RtcClient`](crate::client::RtcClient).
#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// Window within which a repeated (call, action) journal entry is
    /// treated as a duplicate and suppressed.
    pub journal_dedup_window: Duration,
    /// When set, a call still in Dialing or Ringing after this long is
    /// journaled as missed and torn down. `None` leaves a pending call
    /// open until one of the parties acts.
    pub ring_timeout: Option<Duration>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            journal_dedup_window: Duration::from_millis(1200),
            ring_timeout: None,
        }
    }
}
