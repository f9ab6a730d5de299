//! Call journal: human-readable call events persisted into the
//! conversation with the peer.
//!
//! Persistence is fire-and-forget and deduplicated: a repeat of the same
//! (call, action) inside a short window is suppressed, since UI paths and
//! signaling paths can both report the same transition.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::protocol::{CallId, MediaKind, UserId};

/// Lifecycle moments a call reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    Started,
    Incoming,
    Connected,
    Ended,
    Rejected,
    Missed,
}

impl CallAction {
    /// Only these reach the persistence sink; `Incoming` and `Connected`
    /// exist for the live event stream.
    fn persisted(&self) -> bool {
        matches!(
            self,
            CallAction::Started | CallAction::Ended | CallAction::Rejected | CallAction::Missed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallAction::Started => "started",
            CallAction::Incoming => "incoming",
            CallAction::Connected => "connected",
            CallAction::Ended => "ended",
            CallAction::Rejected => "rejected",
            CallAction::Missed => "missed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallLogEntry {
    pub call_id: CallId,
    pub peer_id: UserId,
    pub peer_name: String,
    pub action: CallAction,
    pub media: MediaKind,
    pub duration: Option<Duration>,
}

impl CallLogEntry {
    /// The message text persisted into the conversation.
    pub fn summary(&self) -> String {
        let media = self.media.label();
        let mut text = match self.action {
            CallAction::Started => format!("📞 {media} call started"),
            CallAction::Incoming | CallAction::Connected => format!("📞 {media} call"),
            CallAction::Ended => format!("📞 {media} call ended"),
            CallAction::Rejected => format!("📞 {media} call rejected"),
            CallAction::Missed => format!("📞 Missed {media} call"),
        };
        if self.action == CallAction::Ended {
            if let Some(duration) = self.duration {
                text.push_str(" · ");
                text.push_str(&format_duration(duration));
            }
        }
        text
    }
}

/// Renders a duration as `m:ss`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}", total / 60, total % 60)
}

/// Persistence sink for call events. Implemented by the host application
/// (e.g. posting a message into the chat with the peer).
#[async_trait]
pub trait CallLogger: Send + Sync {
    async fn record(&self, entry: CallLogEntry);
}

/// Logger for embedders without call persistence.
pub struct NullCallLogger;

#[async_trait]
impl CallLogger for NullCallLogger {
    async fn record(&self, _entry: CallLogEntry) {}
}

/// Deduplicating front for a [`CallLogger`].
pub struct CallJournal {
    sink: Arc<dyn CallLogger>,
    window: Duration,
    last: Mutex<Option<(CallId, CallAction, Instant)>>,
}

impl CallJournal {
    pub fn new(sink: Arc<dyn CallLogger>, window: Duration) -> Self {
        Self {
            sink,
            window,
            last: Mutex::new(None),
        }
    }

    pub async fn record(&self, entry: CallLogEntry) {
        if !entry.action.persisted() {
            return;
        }

        let now = Instant::now();
        {
            let mut last = match self.last.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if let Some((call_id, action, at)) = last.as_ref() {
                if *call_id == entry.call_id
                    && *action == entry.action
                    && now.duration_since(*at) < self.window
                {
                    tracing::debug!(
                        call_id = %entry.call_id,
                        action = entry.action.as_str(),
                        "duplicate journal entry suppressed"
                    );
                    return;
                }
            }
            *last = Some((entry.call_id.clone(), entry.action, now));
        }

        tracing::debug!(
            call_id = %entry.call_id,
            peer_id = entry.peer_id,
            action = entry.action.as_str(),
            "journal entry recorded"
        );
        self.sink.record(entry).await;
    }
}
