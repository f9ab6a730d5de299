//! Peer-connection adapter contract.
//!
//! One adapter wraps one host-provided peer-connection primitive per remote
//! peer. The core drives it purely through SDP exchange and candidate
//! trickling and never inspects codec or transport details.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::RtcError;
use crate::media::{MediaStream, MediaTrack};
use crate::protocol::{CallId, IceCandidateInit, RoomId, SessionDescription, UserId};

/// Which session an adapter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerScope {
    Call { call_id: CallId },
    Room { room_id: RoomId, user_id: UserId },
}

/// Callback from the host negotiation engine.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered and should be trickled to the
    /// remote peer.
    IceCandidate(IceCandidateInit),
    /// Remote media arrived.
    RemoteStream(MediaStream),
}

/// A peer event tagged with the session it belongs to, as queued for the
/// dispatcher.
#[derive(Debug, Clone)]
pub struct TaggedPeerEvent {
    pub scope: PeerScope,
    pub event: PeerEvent,
}

/// Sink handed to each adapter at creation. Adapter implementations push
/// their callbacks here; the events re-enter the client's serialized queue
/// tagged with the owning session.
#[derive(Debug, Clone)]
pub struct PeerEvents {
    scope: PeerScope,
    tx: mpsc::UnboundedSender<TaggedPeerEvent>,
}

impl PeerEvents {
    pub(crate) fn new(scope: PeerScope, tx: mpsc::UnboundedSender<TaggedPeerEvent>) -> Self {
        Self { scope, tx }
    }

    pub fn scope(&self) -> &PeerScope {
        &self.scope
    }

    pub fn ice_candidate(&self, candidate: IceCandidateInit) {
        self.emit(PeerEvent::IceCandidate(candidate));
    }

    pub fn remote_stream(&self, stream: MediaStream) {
        self.emit(PeerEvent::RemoteStream(stream));
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.tx.send(TaggedPeerEvent {
            scope: self.scope.clone(),
            event,
        });
    }
}

/// The negotiation engine for one remote peer. Implemented by the host
/// runtime around its peer-connection primitive.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, RtcError>;
    async fn create_answer(&self) -> Result<SessionDescription, RtcError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), RtcError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError>;

    /// Fails with [`RtcError::CandidateRejected`] when the remote
    /// description is not yet set or the candidate is malformed.
    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), RtcError>;

    fn add_track(&self, track: MediaTrack);

    /// Swaps the outgoing video track in place, without renegotiation.
    fn replace_video_track(&self, track: MediaTrack);

    fn close(&self);
}

/// Creates one adapter per remote peer.
pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, events: PeerEvents) -> Arc<dyn PeerConnection>;
}
