//! Meeting room session: one adapter per remote participant, full mesh.
//!
//! Symmetry is broken by join order: the joiner offers to every incumbent
//! listed in the `room-users` snapshot, incumbents answer. Joining a room
//! of N members therefore costs N adapters on the joiner and one new
//! adapter on each incumbent.
//!
//! Screen share swaps the outgoing video track in place on every adapter;
//! no renegotiation round is triggered.

use std::collections::HashMap;
use std::sync::Arc;

use crate::media::MediaStream;
use crate::peer::{PeerConnection, PeerEvents, PeerScope};
use crate::protocol::{
    IceCandidateInit, MediaKind, RoomId, SessionDescription, SignalMessage, UserId,
};

use super::{ControlEvent, Services, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Joining,
    Active,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
}

pub(crate) struct RoomSession {
    room_id: RoomId,
    title: String,
    state: RoomState,
    participants: HashMap<UserId, Participant>,
    peers: HashMap<UserId, Arc<dyn PeerConnection>>,
    local: Option<MediaStream>,
    screen: Option<MediaStream>,
}

impl RoomSession {
    /// Joins a room. The local capture stream is acquired up front and
    /// shared by every adapter created later.
    pub(crate) async fn join(
        services: &Services,
        room_id: RoomId,
        title: String,
    ) -> Result<Self, crate::error::RtcError> {
        let stream = services.media.capture(MediaKind::Video).await?;
        services.notify(SessionEvent::LocalPreview {
            stream: stream.clone(),
        });

        let mut session = Self {
            room_id,
            title,
            state: RoomState::Joining,
            participants: HashMap::new(),
            peers: HashMap::new(),
            local: Some(stream),
            screen: None,
        };

        tracing::info!(room_id, title = %session.title, "joining room");
        session.set_state(services, RoomState::Joining);
        services
            .signaling
            .send(SignalMessage::JoinRoom { room_id })
            .await;
        Ok(session)
    }

    pub(crate) fn id(&self) -> RoomId {
        self.room_id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == RoomState::Closed
    }

    /// Roster snapshot on join: offer to every pre-existing member.
    pub(crate) async fn on_room_users(&mut self, services: &Services, users: Vec<UserId>) {
        self.set_state(services, RoomState::Active);
        tracing::info!(room_id = self.room_id, existing = users.len(), "room roster received");

        for user_id in users {
            if self.peers.contains_key(&user_id) {
                continue;
            }
            self.add_participant(services, user_id, format!("User #{user_id}"));
            let adapter = self.ensure_peer(services, user_id);

            let offer = match adapter.create_offer().await {
                Ok(offer) => offer,
                Err(err) => {
                    tracing::warn!(room_id = self.room_id, user_id, error = %err, "offer creation failed");
                    continue;
                }
            };
            if let Err(err) = adapter.set_local_description(offer.clone()).await {
                tracing::warn!(room_id = self.room_id, user_id, error = %err, "set local description failed");
                continue;
            }
            services
                .signaling
                .send(SignalMessage::Offer {
                    target_id: Some(user_id),
                    call_id: None,
                    room_id: Some(self.room_id),
                    sender_id: None,
                    sdp: offer,
                })
                .await;
        }
    }

    /// Incumbent side: a joiner offered to us; answer it.
    pub(crate) async fn on_offer(
        &mut self,
        services: &Services,
        sender_id: UserId,
        sdp: SessionDescription,
    ) {
        self.add_participant(services, sender_id, format!("User #{sender_id}"));
        let adapter = self.ensure_peer(services, sender_id);

        if let Err(err) = adapter.set_remote_description(sdp).await {
            tracing::warn!(room_id = self.room_id, sender_id, error = %err, "set remote description failed");
            return;
        }
        let answer = match adapter.create_answer().await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(room_id = self.room_id, sender_id, error = %err, "answer creation failed");
                return;
            }
        };
        if let Err(err) = adapter.set_local_description(answer.clone()).await {
            tracing::warn!(room_id = self.room_id, sender_id, error = %err, "set local description failed");
            return;
        }
        services
            .signaling
            .send(SignalMessage::Answer {
                target_id: Some(sender_id),
                call_id: None,
                room_id: Some(self.room_id),
                sender_id: None,
                sdp: answer,
            })
            .await;
    }

    pub(crate) async fn on_answer(
        &mut self,
        _services: &Services,
        sender_id: UserId,
        sdp: SessionDescription,
    ) {
        let Some(adapter) = self.peers.get(&sender_id).cloned() else {
            tracing::debug!(room_id = self.room_id, sender_id, "answer for unknown peer dropped");
            return;
        };
        if let Err(err) = adapter.set_remote_description(sdp).await {
            tracing::warn!(room_id = self.room_id, sender_id, error = %err, "set remote description failed");
        }
    }

    pub(crate) async fn on_candidate(&self, sender_id: UserId, candidate: IceCandidateInit) {
        let Some(adapter) = self.peers.get(&sender_id) else {
            tracing::debug!(room_id = self.room_id, sender_id, "candidate for unknown peer dropped");
            return;
        };
        if let Err(err) = adapter.add_ice_candidate(candidate).await {
            tracing::debug!(room_id = self.room_id, sender_id, error = %err, "candidate dropped");
        }
    }

    pub(crate) async fn send_local_candidate(
        &self,
        services: &Services,
        user_id: UserId,
        candidate: IceCandidateInit,
    ) {
        services
            .signaling
            .send(SignalMessage::IceCandidate {
                target_id: Some(user_id),
                call_id: None,
                room_id: Some(self.room_id),
                sender_id: None,
                candidate,
            })
            .await;
    }

    pub(crate) fn on_user_joined(&mut self, services: &Services, user_id: UserId, username: String) {
        // The joiner offers to us; no adapter until their offer arrives.
        self.participants.insert(
            user_id,
            Participant {
                user_id,
                display_name: username.clone(),
            },
        );
        services.notify(SessionEvent::ParticipantJoined {
            room_id: self.room_id,
            user_id,
            display_name: username,
        });
    }

    pub(crate) fn on_user_left(&mut self, services: &Services, user_id: UserId) {
        self.participants.remove(&user_id);
        if let Some(adapter) = self.peers.remove(&user_id) {
            adapter.close();
        }
        tracing::info!(room_id = self.room_id, user_id, "participant left");
        services.notify(SessionEvent::ParticipantLeft {
            room_id: self.room_id,
            user_id,
        });
    }

    /// Local leave: best-effort `leave-room`, then full teardown.
    pub(crate) async fn leave(&mut self, services: &Services) {
        services
            .signaling
            .send(SignalMessage::LeaveRoom {
                room_id: self.room_id,
            })
            .await;
        self.teardown(services);
    }

    pub(crate) fn on_meeting_ended(&mut self, services: &Services) {
        self.teardown(services);
        services.notify(SessionEvent::MeetingEnded {
            room_id: self.room_id,
        });
    }

    /// Swaps the outgoing video track on every adapter for a screen
    /// capture track. Restarting while a share is live stops the previous
    /// capture first.
    pub(crate) async fn share_screen(&mut self, services: &Services) {
        if self.local.is_none() {
            tracing::debug!(room_id = self.room_id, "share_screen without local media ignored");
            return;
        }
        if self.screen.is_some() {
            self.stop_screen_share(services);
        }

        let screen = match services.media.capture_screen().await {
            Ok(screen) => screen,
            Err(err) => {
                tracing::warn!(room_id = self.room_id, error = %err, "screen capture failed");
                services.notify(SessionEvent::MediaAccessDenied);
                return;
            }
        };
        let Some(track) = screen.first_video_track().cloned() else {
            tracing::warn!(room_id = self.room_id, "screen capture produced no video track");
            screen.stop_all();
            return;
        };

        // Revert to the camera automatically when the host runtime ends
        // the capture (user clicked the OS "stop sharing" control).
        let control = services.control.clone();
        let room_id = self.room_id;
        track.set_on_ended(move || {
            let _ = control.send(ControlEvent::ScreenShareEnded(room_id));
        });

        for adapter in self.peers.values() {
            adapter.replace_video_track(track.clone());
        }
        tracing::info!(room_id = self.room_id, "screen share started");
        services.notify(SessionEvent::ScreenShareStarted {
            room_id: self.room_id,
            stream: screen.clone(),
        });
        self.screen = Some(screen);
    }

    /// Stops a live share and puts the camera track back on every adapter.
    /// Also the revert path when the capture ended host-side.
    pub(crate) fn stop_screen_share(&mut self, services: &Services) {
        let Some(screen) = self.screen.take() else {
            return;
        };
        if let Some(track) = screen.first_video_track() {
            track.clear_on_ended();
        }
        screen.stop_all();

        if let Some(local) = &self.local {
            if let Some(camera) = local.first_video_track() {
                for adapter in self.peers.values() {
                    adapter.replace_video_track(camera.clone());
                }
            }
        }
        tracing::info!(room_id = self.room_id, "screen share stopped");
        services.notify(SessionEvent::ScreenShareStopped {
            room_id: self.room_id,
        });
    }

    /// Local-only: flips `enabled` on the audio tracks. Returns the new
    /// enabled state.
    pub(crate) fn toggle_mute(&self) -> bool {
        let mut enabled = false;
        if let Some(local) = &self.local {
            for track in local.audio_tracks() {
                enabled = track.toggle_enabled();
            }
        }
        enabled
    }

    /// Local-only: flips `enabled` on the video tracks.
    pub(crate) fn toggle_camera(&self) -> bool {
        let mut enabled = false;
        if let Some(local) = &self.local {
            for track in local.video_tracks() {
                enabled = track.toggle_enabled();
            }
        }
        enabled
    }

    fn add_participant(&mut self, services: &Services, user_id: UserId, display_name: String) {
        if self.participants.contains_key(&user_id) {
            return;
        }
        self.participants.insert(
            user_id,
            Participant {
                user_id,
                display_name: display_name.clone(),
            },
        );
        services.notify(SessionEvent::ParticipantJoined {
            room_id: self.room_id,
            user_id,
            display_name,
        });
    }

    fn ensure_peer(&mut self, services: &Services, user_id: UserId) -> Arc<dyn PeerConnection> {
        if let Some(existing) = self.peers.get(&user_id) {
            return existing.clone();
        }
        let events = PeerEvents::new(
            PeerScope::Room {
                room_id: self.room_id,
                user_id,
            },
            services.peer_events.clone(),
        );
        let adapter = services.peers.create(events);
        if let Some(local) = &self.local {
            for track in local.tracks() {
                adapter.add_track(track.clone());
            }
        }
        self.peers.insert(user_id, adapter.clone());
        adapter
    }

    fn teardown(&mut self, services: &Services) {
        for (_, adapter) in self.peers.drain() {
            adapter.close();
        }
        self.participants.clear();
        if let Some(screen) = self.screen.take() {
            if let Some(track) = screen.first_video_track() {
                track.clear_on_ended();
            }
            screen.stop_all();
        }
        if let Some(local) = self.local.take() {
            local.stop_all();
        }
        tracing::info!(room_id = self.room_id, "room session closed");
        self.set_state(services, RoomState::Closed);
    }

    fn set_state(&mut self, services: &Services, state: RoomState) {
        self.state = state;
        services.notify(SessionEvent::RoomStateChanged {
            room_id: self.room_id,
            state,
        });
    }
}
