//! Direct (1:1) call state machine.
//!
//! The caller path is `Dialing → Connected`, the receiver path is
//! `Ringing → Connected`; both end in `Ended` (or `Missed` when a ring
//! timeout is configured). Idle is the absence of a session.
//!
//! The caller is the only side that ever produces an offer, and only after
//! the callee's `accept-call` arrives. Any signaling event whose `call_id`
//! does not match the live session is dropped upstream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RtcError;
use crate::journal::{CallAction, CallLogEntry};
use crate::media::MediaStream;
use crate::peer::{PeerConnection, PeerEvents, PeerScope};
use crate::protocol::{
    CallId, IceCandidateInit, MediaKind, SessionDescription, SignalMessage, UserId,
};

use super::{Services, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Dialing,
    Ringing,
    Connected,
    Ended,
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallRole {
    Caller,
    Callee,
}

pub(crate) struct CallSession {
    call_id: CallId,
    peer_id: UserId,
    peer_name: String,
    media: MediaKind,
    role: CallRole,
    state: CallState,
    started_at: Option<Instant>,
    adapter: Option<Arc<dyn PeerConnection>>,
    local: Option<MediaStream>,
    remote_described: bool,
    offered: bool,
}

impl CallSession {
    /// Initiates a call. Media is acquired eagerly so the local preview is
    /// available while ringing; the adapter is created up front as well.
    pub(crate) async fn dial(
        services: &Services,
        peer_id: UserId,
        peer_name: String,
        media: MediaKind,
    ) -> Result<Self, crate::error::RtcError> {
        let call_id = CallId::generate();
        let mut session = Self {
            call_id: call_id.clone(),
            peer_id,
            peer_name,
            media,
            role: CallRole::Caller,
            state: CallState::Dialing,
            started_at: None,
            adapter: None,
            local: None,
            remote_described: false,
            offered: false,
        };

        session.ensure_media(services).await?;
        session.ensure_adapter(services);

        tracing::info!(call_id = %call_id, peer_id, media = media.label(), "dialing");
        session.log(services, CallAction::Started).await;
        services
            .signaling
            .send(SignalMessage::CallUser {
                target_id: peer_id,
                call_id,
                media,
            })
            .await;
        session.set_state(services, CallState::Dialing);
        Ok(session)
    }

    /// Registers an incoming call. No media and no adapter yet; both wait
    /// for the local accept.
    pub(crate) async fn ringing(
        services: &Services,
        call_id: CallId,
        from_id: UserId,
        from_username: String,
        media: MediaKind,
    ) -> Self {
        let mut session = Self {
            call_id: call_id.clone(),
            peer_id: from_id,
            peer_name: from_username.clone(),
            media,
            role: CallRole::Callee,
            state: CallState::Ringing,
            started_at: None,
            adapter: None,
            local: None,
            remote_described: false,
            offered: false,
        };

        tracing::info!(call_id = %call_id, from_id, media = media.label(), "incoming call");
        services.notify(SessionEvent::IncomingCall {
            call_id: call_id.clone(),
            from_id,
            from_username,
            media,
        });
        session.set_state(services, CallState::Ringing);
        session.log(services, CallAction::Incoming).await;
        session
    }

    pub(crate) fn id(&self) -> &CallId {
        &self.call_id
    }

    pub(crate) fn matches(&self, call_id: &CallId) -> bool {
        self.call_id == *call_id
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self.state, CallState::Ended | CallState::Missed)
    }

    /// Local accept. The connection completes passively from here: the
    /// caller produces the offer once `accept-call` reaches it.
    pub(crate) async fn accept(&mut self, services: &Services) {
        if self.state != CallState::Ringing {
            tracing::debug!(call_id = %self.call_id, state = ?self.state, "accept ignored");
            return;
        }
        if self.ensure_media(services).await.is_err() {
            self.abort_media_denied(services).await;
            return;
        }
        self.ensure_adapter(services);

        services
            .signaling
            .send(SignalMessage::AcceptCall {
                target_id: self.peer_id,
                call_id: self.call_id.clone(),
            })
            .await;

        // Optimistic: connected when the local accept completes, not when
        // media actually flows.
        self.started_at = Some(Instant::now());
        self.set_state(services, CallState::Connected);
        self.log(services, CallAction::Connected).await;
    }

    /// Caller side: the callee accepted, produce the one and only offer.
    pub(crate) async fn on_accepted(&mut self, services: &Services) {
        if self.role != CallRole::Caller || self.state != CallState::Dialing {
            tracing::debug!(call_id = %self.call_id, state = ?self.state, "accept-call ignored");
            return;
        }
        if self.offered {
            tracing::debug!(call_id = %self.call_id, "duplicate accept-call ignored");
            return;
        }
        self.ensure_adapter(services);
        let Some(adapter) = self.adapter.clone() else {
            return;
        };

        let offer = match adapter.create_offer().await {
            Ok(offer) => offer,
            Err(err) => {
                tracing::warn!(call_id = %self.call_id, error = %err, "offer creation failed");
                return;
            }
        };
        if let Err(err) = adapter.set_local_description(offer.clone()).await {
            tracing::warn!(call_id = %self.call_id, error = %err, "set local description failed");
            return;
        }
        self.offered = true;

        services
            .signaling
            .send(SignalMessage::Offer {
                target_id: Some(self.peer_id),
                call_id: Some(self.call_id.clone()),
                room_id: None,
                sender_id: None,
                sdp: offer,
            })
            .await;
    }

    /// Acceptor side: apply the caller's offer and answer it.
    pub(crate) async fn on_offer(&mut self, services: &Services, sdp: SessionDescription) {
        if self.remote_described {
            tracing::debug!(call_id = %self.call_id, error = %RtcError::DuplicateNegotiation, "offer ignored");
            return;
        }
        // An offer can outrun the local accept flow; acquire media late in
        // that case.
        if self.ensure_media(services).await.is_err() {
            self.abort_media_denied(services).await;
            return;
        }
        self.ensure_adapter(services);
        let Some(adapter) = self.adapter.clone() else {
            return;
        };

        if let Err(err) = adapter.set_remote_description(sdp).await {
            tracing::warn!(call_id = %self.call_id, error = %err, "set remote description failed");
            return;
        }
        self.remote_described = true;

        let answer = match adapter.create_answer().await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(call_id = %self.call_id, error = %err, "answer creation failed");
                return;
            }
        };
        if let Err(err) = adapter.set_local_description(answer.clone()).await {
            tracing::warn!(call_id = %self.call_id, error = %err, "set local description failed");
            return;
        }

        services
            .signaling
            .send(SignalMessage::Answer {
                target_id: Some(self.peer_id),
                call_id: Some(self.call_id.clone()),
                room_id: None,
                sender_id: None,
                sdp: answer,
            })
            .await;

        if self.state != CallState::Connected {
            self.started_at = Some(Instant::now());
            self.set_state(services, CallState::Connected);
            self.log(services, CallAction::Connected).await;
        }
    }

    /// Caller side: the callee answered our offer.
    pub(crate) async fn on_answer(&mut self, services: &Services, sdp: SessionDescription) {
        if self.role != CallRole::Caller {
            tracing::debug!(call_id = %self.call_id, "answer on callee side ignored");
            return;
        }
        if self.remote_described {
            tracing::debug!(call_id = %self.call_id, error = %RtcError::DuplicateNegotiation, "answer ignored");
            return;
        }
        let Some(adapter) = self.adapter.clone() else {
            tracing::debug!(call_id = %self.call_id, "answer without adapter dropped");
            return;
        };
        if let Err(err) = adapter.set_remote_description(sdp).await {
            tracing::warn!(call_id = %self.call_id, error = %err, "set remote description failed");
            return;
        }
        self.remote_described = true;
        self.started_at = Some(Instant::now());
        self.set_state(services, CallState::Connected);
        self.log(services, CallAction::Connected).await;
    }

    /// Applies a trickled candidate. Failures (e.g. remote description not
    /// yet set) drop the candidate; nothing is buffered.
    pub(crate) async fn on_candidate(&self, candidate: IceCandidateInit) {
        let Some(adapter) = self.adapter.as_ref() else {
            tracing::debug!(call_id = %self.call_id, "candidate before adapter dropped");
            return;
        };
        if let Err(err) = adapter.add_ice_candidate(candidate).await {
            tracing::debug!(call_id = %self.call_id, error = %err, "candidate dropped");
        }
    }

    /// Trickles a locally gathered candidate to the peer.
    pub(crate) async fn send_local_candidate(
        &self,
        services: &Services,
        candidate: IceCandidateInit,
    ) {
        services
            .signaling
            .send(SignalMessage::IceCandidate {
                target_id: Some(self.peer_id),
                call_id: Some(self.call_id.clone()),
                room_id: None,
                sender_id: None,
                candidate,
            })
            .await;
    }

    /// Local hang-up, valid in any state.
    pub(crate) async fn hang_up(&mut self, services: &Services) {
        services
            .signaling
            .send(SignalMessage::EndCall {
                target_id: self.peer_id,
                call_id: self.call_id.clone(),
            })
            .await;
        self.log(services, CallAction::Ended).await;
        self.teardown(services, CallState::Ended);
    }

    pub(crate) async fn on_remote_end(&mut self, services: &Services) {
        self.log(services, CallAction::Ended).await;
        self.teardown(services, CallState::Ended);
    }

    /// Local decline, valid only while ringing; never acquires media.
    pub(crate) async fn reject(&mut self, services: &Services) {
        if self.state != CallState::Ringing {
            tracing::debug!(call_id = %self.call_id, state = ?self.state, "reject ignored");
            return;
        }
        services
            .signaling
            .send(SignalMessage::RejectCall {
                target_id: self.peer_id,
                call_id: self.call_id.clone(),
            })
            .await;
        self.log(services, CallAction::Rejected).await;
        self.teardown(services, CallState::Ended);
    }

    pub(crate) async fn on_rejected(&mut self, services: &Services) {
        self.log(services, CallAction::Rejected).await;
        self.teardown(services, CallState::Ended);
    }

    /// Ring timeout: nobody answered in time.
    pub(crate) async fn missed(&mut self, services: &Services) {
        if !matches!(self.state, CallState::Dialing | CallState::Ringing) {
            return;
        }
        if self.role == CallRole::Caller {
            // Stop the remote ringer.
            services
                .signaling
                .send(SignalMessage::EndCall {
                    target_id: self.peer_id,
                    call_id: self.call_id.clone(),
                })
                .await;
        }
        self.log(services, CallAction::Missed).await;
        self.teardown(services, CallState::Missed);
    }

    async fn abort_media_denied(&mut self, services: &Services) {
        services.notify(SessionEvent::MediaAccessDenied);
        services
            .signaling
            .send(SignalMessage::RejectCall {
                target_id: self.peer_id,
                call_id: self.call_id.clone(),
            })
            .await;
        self.log(services, CallAction::Rejected).await;
        self.teardown(services, CallState::Ended);
    }

    async fn ensure_media(&mut self, services: &Services) -> Result<(), crate::error::RtcError> {
        if self.local.is_none() {
            let stream = services.media.capture(self.media).await?;
            services.notify(SessionEvent::LocalPreview {
                stream: stream.clone(),
            });
            self.local = Some(stream);
        }
        Ok(())
    }

    fn ensure_adapter(&mut self, services: &Services) {
        if self.adapter.is_some() {
            return;
        }
        let events = PeerEvents::new(
            PeerScope::Call {
                call_id: self.call_id.clone(),
            },
            services.peer_events.clone(),
        );
        let adapter = services.peers.create(events);
        if let Some(local) = &self.local {
            for track in local.tracks() {
                adapter.add_track(track.clone());
            }
        }
        self.adapter = Some(adapter);
    }

    fn teardown(&mut self, services: &Services, final_state: CallState) {
        if let Some(adapter) = self.adapter.take() {
            adapter.close();
        }
        if let Some(local) = self.local.take() {
            local.stop_all();
        }
        self.remote_described = false;
        tracing::info!(call_id = %self.call_id, state = ?final_state, "call torn down");
        self.set_state(services, final_state);
    }

    fn set_state(&mut self, services: &Services, state: CallState) {
        self.state = state;
        services.notify(SessionEvent::CallStateChanged {
            call_id: self.call_id.clone(),
            state,
        });
    }

    fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|at| at.elapsed())
    }

    async fn log(&self, services: &Services, action: CallAction) {
        services
            .journal
            .record(CallLogEntry {
                call_id: self.call_id.clone(),
                peer_id: self.peer_id,
                peer_name: self.peer_name.clone(),
                action,
                media: self.media,
                duration: self.elapsed(),
            })
            .await;
    }
}
