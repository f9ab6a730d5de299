//! Per-session state machines.

mod call;
mod room;

pub use call::CallState;
pub use room::{Participant, RoomState};

pub(crate) use call::CallSession;
pub(crate) use room::RoomSession;

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::RtcConfig;
use crate::journal::CallJournal;
use crate::media::{MediaSource, MediaStream};
use crate::peer::{PeerConnectionFactory, PeerScope, TaggedPeerEvent};
use crate::protocol::{CallId, MediaKind, RoomId, UserId};
use crate::signaling::SignalingChannel;

/// Internal control events fed back into the dispatcher queue.
#[derive(Debug, Clone)]
pub(crate) enum ControlEvent {
    /// A Dialing/Ringing call outlived the configured ring timeout.
    RingExpired(CallId),
    /// The host runtime ended the screen capture (e.g. via OS UI).
    ScreenShareEnded(RoomId),
}

/// Notifications for the embedding UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    IncomingCall {
        call_id: CallId,
        from_id: UserId,
        from_username: String,
        media: MediaKind,
    },
    CallStateChanged {
        call_id: CallId,
        state: CallState,
    },
    /// A local capture stream became available (camera preview).
    LocalPreview {
        stream: MediaStream,
    },
    /// Remote media arrived for a call or a room participant.
    RemoteStream {
        scope: PeerScope,
        stream: MediaStream,
    },
    /// Capture permission was refused; the call or join attempt aborted.
    MediaAccessDenied,
    RoomStateChanged {
        room_id: RoomId,
        state: RoomState,
    },
    ParticipantJoined {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
    },
    ParticipantLeft {
        room_id: RoomId,
        user_id: UserId,
    },
    MeetingEnded {
        room_id: RoomId,
    },
    /// Host-side guard: the meeting has not started yet.
    MeetingInactive,
    ScreenShareStarted {
        room_id: RoomId,
        stream: MediaStream,
    },
    ScreenShareStopped {
        room_id: RoomId,
    },
}

/// Dependencies shared by every session, owned by the client actor.
pub(crate) struct Services {
    pub signaling: SignalingChannel,
    pub media: Arc<dyn MediaSource>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub peer_events: mpsc::UnboundedSender<TaggedPeerEvent>,
    pub control: mpsc::UnboundedSender<ControlEvent>,
    pub notifications: mpsc::UnboundedSender<SessionEvent>,
    pub journal: CallJournal,
    pub config: RtcConfig,
}

impl Services {
    pub(crate) fn notify(&self, event: SessionEvent) {
        let _ = self.notifications.send(event);
    }
}
