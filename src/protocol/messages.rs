//! Signaling message protocol shared with the relay.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User identifier assigned by the surrounding session.
pub type UserId = u64;

/// Meeting room identifier ("space" in relay payloads).
pub type RoomId = u64;

/// Opaque correlation token for one direct-call negotiation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Media profile of a direct call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Human-readable label used in call journal entries.
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Audio => "Audio",
            MediaKind::Video => "Video",
        }
    }
}

/// An SDP offer or answer, shaped like an RTCSessionDescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A trickled ICE candidate, shaped like an RTCIceCandidateInit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidateInit {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }
}

/// Every control event exchanged over the signaling channel.
///
/// `offer`, `answer` and `ice-candidate` carry either a `call_id` (direct
/// call) or a `room_id` + `sender_id` (meeting); the two correlation spaces
/// never mix in one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SignalMessage {
    // Direct calls
    CallUser {
        target_id: UserId,
        call_id: CallId,
        media: MediaKind,
    },
    IncomingCall {
        call_id: CallId,
        from_id: UserId,
        from_username: String,
        media: MediaKind,
    },
    AcceptCall {
        target_id: UserId,
        call_id: CallId,
    },
    RejectCall {
        target_id: UserId,
        call_id: CallId,
    },
    EndCall {
        target_id: UserId,
        call_id: CallId,
    },

    // SDP / ICE exchange (calls and rooms)
    Offer {
        #[serde(skip_serializing_if = "Option::is_none")]
        target_id: Option<UserId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_id: Option<UserId>,
        sdp: SessionDescription,
    },
    Answer {
        #[serde(skip_serializing_if = "Option::is_none")]
        target_id: Option<UserId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_id: Option<UserId>,
        sdp: SessionDescription,
    },
    IceCandidate {
        #[serde(skip_serializing_if = "Option::is_none")]
        target_id: Option<UserId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_id: Option<UserId>,
        candidate: IceCandidateInit,
    },

    // Meetings
    JoinRoom {
        room_id: RoomId,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    RoomUsers {
        space_id: RoomId,
        users: Vec<UserId>,
    },
    UserJoined {
        user_id: UserId,
        username: String,
    },
    UserLeft {
        user_id: UserId,
    },
    MeetingEnded,
    MeetingInactive,
}

impl SignalMessage {
    /// Wire tag of the message, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalMessage::CallUser { .. } => "call-user",
            SignalMessage::IncomingCall { .. } => "incoming-call",
            SignalMessage::AcceptCall { .. } => "accept-call",
            SignalMessage::RejectCall { .. } => "reject-call",
            SignalMessage::EndCall { .. } => "end-call",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::JoinRoom { .. } => "join-room",
            SignalMessage::LeaveRoom { .. } => "leave-room",
            SignalMessage::RoomUsers { .. } => "room-users",
            SignalMessage::UserJoined { .. } => "user-joined",
            SignalMessage::UserLeft { .. } => "user-left",
            SignalMessage::MeetingEnded => "meeting-ended",
            SignalMessage::MeetingInactive => "meeting-inactive",
        }
    }
}
