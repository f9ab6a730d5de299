//! The client actor: one serialized dispatcher per client.
//!
//! Every inbound signaling message, local command, adapter callback and
//! timer lands in one task and is handled to completion before the next,
//! so session state is never mutated concurrently. Messages route by
//! correlation id (`call_id` xor `room_id`); anything referencing a dead
//! session is dropped.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::RtcConfig;
use crate::error::RtcError;
use crate::journal::{CallJournal, CallLogger};
use crate::media::MediaSource;
use crate::peer::{PeerConnectionFactory, PeerEvent, PeerScope, TaggedPeerEvent};
use crate::protocol::{CallId, MediaKind, RoomId, SignalMessage, UserId};
use crate::session::{CallSession, ControlEvent, RoomSession, Services, SessionEvent};
use crate::signaling::{SignalingChannel, SignalingTransport};

/// Local user actions, queued by [`RtcHandle`].
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    StartCall {
        peer_id: UserId,
        peer_name: String,
        media: MediaKind,
    },
    AcceptCall,
    RejectCall,
    EndCall,
    JoinRoom {
        room_id: RoomId,
        title: String,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    ShareScreen {
        room_id: RoomId,
    },
    StopScreenShare {
        room_id: RoomId,
    },
    ToggleMute {
        room_id: RoomId,
    },
    ToggleCamera {
        room_id: RoomId,
    },
    Shutdown,
}

/// Cloneable command surface for the embedding application.
#[derive(Clone)]
pub struct RtcHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RtcHandle {
    /// Opens the signaling channel eagerly so inbound events (e.g. an
    /// incoming call) can arrive before the first outbound send. Sends
    /// still reconnect on demand regardless.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    pub fn start_call(&self, peer_id: UserId, peer_name: impl Into<String>, media: MediaKind) {
        self.send(Command::StartCall {
            peer_id,
            peer_name: peer_name.into(),
            media,
        });
    }

    pub fn accept_call(&self) {
        self.send(Command::AcceptCall);
    }

    pub fn reject_call(&self) {
        self.send(Command::RejectCall);
    }

    pub fn end_call(&self) {
        self.send(Command::EndCall);
    }

    pub fn join_room(&self, room_id: RoomId, title: impl Into<String>) {
        self.send(Command::JoinRoom {
            room_id,
            title: title.into(),
        });
    }

    pub fn leave_room(&self, room_id: RoomId) {
        self.send(Command::LeaveRoom { room_id });
    }

    pub fn share_screen(&self, room_id: RoomId) {
        self.send(Command::ShareScreen { room_id });
    }

    pub fn stop_screen_share(&self, room_id: RoomId) {
        self.send(Command::StopScreenShare { room_id });
    }

    pub fn toggle_mute(&self, room_id: RoomId) {
        self.send(Command::ToggleMute { room_id });
    }

    pub fn toggle_camera(&self, room_id: RoomId) {
        self.send(Command::ToggleCamera { room_id });
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        let _ = self.commands.send(command);
    }
}

pub struct RtcClient {
    services: Services,
    signal_rx: mpsc::UnboundedReceiver<SignalMessage>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    peer_rx: mpsc::UnboundedReceiver<TaggedPeerEvent>,
    control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    call: Option<CallSession>,
    room: Option<RoomSession>,
}

impl RtcClient {
    /// Wires a client to its capability interfaces. Returns the actor
    /// (drive it with [`RtcClient::run`], typically in a spawned task), the
    /// command handle and the notification stream.
    pub fn new(
        config: RtcConfig,
        transport: Arc<dyn SignalingTransport>,
        media: Arc<dyn MediaSource>,
        peers: Arc<dyn PeerConnectionFactory>,
        logger: Arc<dyn CallLogger>,
    ) -> (Self, RtcHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let services = Services {
            signaling: SignalingChannel::new(transport, signal_tx),
            media,
            peers,
            peer_events: peer_tx,
            control: control_tx,
            notifications: notify_tx,
            journal: CallJournal::new(logger, config.journal_dedup_window),
            config,
        };

        let client = Self {
            services,
            signal_rx,
            command_rx,
            peer_rx,
            control_rx,
            call: None,
            room: None,
        };
        (client, RtcHandle { commands: command_tx }, notify_rx)
    }

    /// Runs the dispatcher until shutdown (explicit command or every
    /// handle dropped). Live sessions are torn down on the way out.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(message) = self.signal_rx.recv() => {
                    self.on_signal(message).await;
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => {
                            self.shutdown().await;
                            break;
                        }
                        Some(command) => self.on_command(command).await,
                    }
                }
                Some(event) = self.peer_rx.recv() => {
                    self.on_peer_event(event).await;
                }
                Some(event) = self.control_rx.recv() => {
                    self.on_control(event).await;
                }
            }
            self.reap();
        }
    }

    async fn on_signal(&mut self, message: SignalMessage) {
        tracing::debug!(event = message.event_name(), "signal received");
        match message {
            SignalMessage::IncomingCall {
                call_id,
                from_id,
                from_username,
                media,
            } => {
                self.on_incoming_call(call_id, from_id, from_username, media)
                    .await;
            }
            SignalMessage::AcceptCall { call_id, .. } => match self.call.as_mut() {
                Some(call) if call.matches(&call_id) => call.on_accepted(&self.services).await,
                _ => drop_unroutable("accept-call", call_id.as_str()),
            },
            SignalMessage::RejectCall { call_id, .. } => match self.call.as_mut() {
                Some(call) if call.matches(&call_id) => call.on_rejected(&self.services).await,
                _ => drop_unroutable("reject-call", call_id.as_str()),
            },
            SignalMessage::EndCall { call_id, .. } => match self.call.as_mut() {
                Some(call) if call.matches(&call_id) => call.on_remote_end(&self.services).await,
                _ => drop_unroutable("end-call", call_id.as_str()),
            },
            SignalMessage::Offer {
                call_id,
                room_id,
                sender_id,
                sdp,
                ..
            } => {
                if let Some(room_id) = room_id {
                    let Some(sender_id) = sender_id else {
                        tracing::debug!(room_id, "room offer without sender dropped");
                        return;
                    };
                    match self.room.as_mut() {
                        Some(room) if room.id() == room_id => {
                            room.on_offer(&self.services, sender_id, sdp).await;
                        }
                        _ => drop_unroutable("offer", &room_id.to_string()),
                    }
                } else if let Some(call_id) = call_id {
                    match self.call.as_mut() {
                        Some(call) if call.matches(&call_id) => {
                            call.on_offer(&self.services, sdp).await;
                        }
                        _ => drop_unroutable("offer", call_id.as_str()),
                    }
                } else {
                    tracing::debug!("offer without correlation id dropped");
                }
            }
            SignalMessage::Answer {
                call_id,
                room_id,
                sender_id,
                sdp,
                ..
            } => {
                if let Some(room_id) = room_id {
                    let Some(sender_id) = sender_id else {
                        tracing::debug!(room_id, "room answer without sender dropped");
                        return;
                    };
                    match self.room.as_mut() {
                        Some(room) if room.id() == room_id => {
                            room.on_answer(&self.services, sender_id, sdp).await;
                        }
                        _ => drop_unroutable("answer", &room_id.to_string()),
                    }
                } else if let Some(call_id) = call_id {
                    match self.call.as_mut() {
                        Some(call) if call.matches(&call_id) => {
                            call.on_answer(&self.services, sdp).await;
                        }
                        _ => drop_unroutable("answer", call_id.as_str()),
                    }
                } else {
                    tracing::debug!("answer without correlation id dropped");
                }
            }
            SignalMessage::IceCandidate {
                call_id,
                room_id,
                sender_id,
                candidate,
                ..
            } => {
                if let Some(room_id) = room_id {
                    let Some(sender_id) = sender_id else {
                        tracing::debug!(room_id, "room candidate without sender dropped");
                        return;
                    };
                    match self.room.as_ref() {
                        Some(room) if room.id() == room_id => {
                            room.on_candidate(sender_id, candidate).await;
                        }
                        _ => drop_unroutable("ice-candidate", &room_id.to_string()),
                    }
                } else if let Some(call_id) = call_id {
                    match self.call.as_ref() {
                        Some(call) if call.matches(&call_id) => {
                            call.on_candidate(candidate).await;
                        }
                        _ => drop_unroutable("ice-candidate", call_id.as_str()),
                    }
                } else {
                    tracing::debug!("candidate without correlation id dropped");
                }
            }
            SignalMessage::RoomUsers { space_id, users } => match self.room.as_mut() {
                Some(room) if room.id() == space_id => {
                    room.on_room_users(&self.services, users).await;
                }
                _ => drop_unroutable("room-users", &space_id.to_string()),
            },
            SignalMessage::UserJoined { user_id, username } => {
                if let Some(room) = self.room.as_mut() {
                    room.on_user_joined(&self.services, user_id, username);
                }
            }
            SignalMessage::UserLeft { user_id } => {
                if let Some(room) = self.room.as_mut() {
                    room.on_user_left(&self.services, user_id);
                }
            }
            SignalMessage::MeetingEnded => {
                if let Some(room) = self.room.as_mut() {
                    room.on_meeting_ended(&self.services);
                }
            }
            SignalMessage::MeetingInactive => {
                self.services.notify(SessionEvent::MeetingInactive);
            }
            // Client-originated kinds; a relay should never reflect them.
            SignalMessage::CallUser { .. }
            | SignalMessage::JoinRoom { .. }
            | SignalMessage::LeaveRoom { .. } => {
                tracing::debug!(event = "client-originated", "reflected message dropped");
            }
        }
    }

    async fn on_incoming_call(
        &mut self,
        call_id: CallId,
        from_id: UserId,
        from_username: String,
        media: MediaKind,
    ) {
        if let Some(call) = self.call.as_ref().filter(|call| !call.is_terminal()) {
            if call.matches(&call_id) {
                tracing::debug!(call_id = %call_id, "duplicate incoming-call ignored");
            } else {
                tracing::debug!(call_id = %call_id, from_id, "busy, rejecting incoming call");
                self.services
                    .signaling
                    .send(SignalMessage::RejectCall {
                        target_id: from_id,
                        call_id,
                    })
                    .await;
            }
            return;
        }
        let call =
            CallSession::ringing(&self.services, call_id.clone(), from_id, from_username, media)
                .await;
        self.arm_ring_timer(call_id);
        self.call = Some(call);
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.services.signaling.ensure_open().await,
            Command::StartCall {
                peer_id,
                peer_name,
                media,
            } => {
                if self.call.as_ref().is_some_and(|call| !call.is_terminal()) {
                    tracing::warn!(error = %RtcError::CallInProgress, "start_call ignored");
                    return;
                }
                match CallSession::dial(&self.services, peer_id, peer_name, media).await {
                    Ok(call) => {
                        self.arm_ring_timer(call.id().clone());
                        self.call = Some(call);
                    }
                    Err(RtcError::MediaAccessDenied) => {
                        self.services.notify(SessionEvent::MediaAccessDenied);
                    }
                    Err(err) => tracing::warn!(error = %err, "start_call failed"),
                }
            }
            Command::AcceptCall => match self.call.as_mut() {
                Some(call) => call.accept(&self.services).await,
                None => tracing::debug!("accept without live call ignored"),
            },
            Command::RejectCall => match self.call.as_mut() {
                Some(call) => call.reject(&self.services).await,
                None => tracing::debug!("reject without live call ignored"),
            },
            Command::EndCall => match self.call.as_mut() {
                Some(call) => call.hang_up(&self.services).await,
                None => tracing::debug!("end without live call ignored"),
            },
            Command::JoinRoom { room_id, title } => {
                if let Some(room) = self.room.as_mut() {
                    if room.id() == room_id {
                        tracing::debug!(room_id, "already in room");
                        return;
                    }
                    // Only one meeting at a time; switch by leaving first.
                    room.leave(&self.services).await;
                }
                match RoomSession::join(&self.services, room_id, title).await {
                    Ok(room) => self.room = Some(room),
                    Err(RtcError::MediaAccessDenied) => {
                        self.services.notify(SessionEvent::MediaAccessDenied);
                    }
                    Err(err) => tracing::warn!(room_id, error = %err, "join_room failed"),
                }
            }
            Command::LeaveRoom { room_id } => match self.room.as_mut() {
                Some(room) if room.id() == room_id => room.leave(&self.services).await,
                _ => {
                    let err = RtcError::NoSuchSession(room_id.to_string());
                    tracing::debug!(error = %err, "leave ignored");
                }
            },
            Command::ShareScreen { room_id } => match self.room.as_mut() {
                Some(room) if room.id() == room_id => room.share_screen(&self.services).await,
                _ => tracing::debug!(room_id, "share_screen for unknown room ignored"),
            },
            Command::StopScreenShare { room_id } => match self.room.as_mut() {
                Some(room) if room.id() == room_id => room.stop_screen_share(&self.services),
                _ => tracing::debug!(room_id, "stop_screen_share for unknown room ignored"),
            },
            Command::ToggleMute { room_id } => match self.room.as_ref() {
                Some(room) if room.id() == room_id => {
                    let enabled = room.toggle_mute();
                    tracing::debug!(room_id, enabled, "microphone toggled");
                }
                _ => tracing::debug!(room_id, "toggle_mute for unknown room ignored"),
            },
            Command::ToggleCamera { room_id } => match self.room.as_ref() {
                Some(room) if room.id() == room_id => {
                    let enabled = room.toggle_camera();
                    tracing::debug!(room_id, enabled, "camera toggled");
                }
                _ => tracing::debug!(room_id, "toggle_camera for unknown room ignored"),
            },
            // Intercepted by the run loop; nothing to do here.
            Command::Shutdown => tracing::debug!("shutdown handled by run loop"),
        }
    }

    async fn on_peer_event(&mut self, event: TaggedPeerEvent) {
        match (event.scope, event.event) {
            (PeerScope::Call { call_id }, PeerEvent::IceCandidate(candidate)) => {
                match self.call.as_ref() {
                    Some(call) if call.matches(&call_id) => {
                        call.send_local_candidate(&self.services, candidate).await;
                    }
                    _ => drop_unroutable("local candidate", call_id.as_str()),
                }
            }
            (PeerScope::Call { call_id }, PeerEvent::RemoteStream(stream)) => {
                match self.call.as_ref() {
                    Some(call) if call.matches(&call_id) => {
                        self.services.notify(SessionEvent::RemoteStream {
                            scope: PeerScope::Call { call_id },
                            stream,
                        });
                    }
                    _ => drop_unroutable("remote stream", call_id.as_str()),
                }
            }
            (PeerScope::Room { room_id, user_id }, PeerEvent::IceCandidate(candidate)) => {
                match self.room.as_ref() {
                    Some(room) if room.id() == room_id => {
                        room.send_local_candidate(&self.services, user_id, candidate)
                            .await;
                    }
                    _ => drop_unroutable("local candidate", &room_id.to_string()),
                }
            }
            (PeerScope::Room { room_id, user_id }, PeerEvent::RemoteStream(stream)) => {
                match self.room.as_ref() {
                    Some(room) if room.id() == room_id => {
                        self.services.notify(SessionEvent::RemoteStream {
                            scope: PeerScope::Room { room_id, user_id },
                            stream,
                        });
                    }
                    _ => drop_unroutable("remote stream", &room_id.to_string()),
                }
            }
        }
    }

    async fn on_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::RingExpired(call_id) => match self.call.as_mut() {
                Some(call) if call.matches(&call_id) => call.missed(&self.services).await,
                _ => {}
            },
            ControlEvent::ScreenShareEnded(room_id) => match self.room.as_mut() {
                Some(room) if room.id() == room_id => room.stop_screen_share(&self.services),
                _ => {}
            },
        }
    }

    fn arm_ring_timer(&self, call_id: CallId) {
        let Some(timeout) = self.services.config.ring_timeout else {
            return;
        };
        let control = self.services.control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = control.send(ControlEvent::RingExpired(call_id));
        });
    }

    /// Drops sessions that reached a terminal state during dispatch.
    fn reap(&mut self) {
        if self.call.as_ref().is_some_and(|call| call.is_terminal()) {
            self.call = None;
        }
        if self.room.as_ref().is_some_and(|room| room.is_closed()) {
            self.room = None;
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut call) = self.call.take() {
            call.hang_up(&self.services).await;
        }
        if let Some(mut room) = self.room.take() {
            room.leave(&self.services).await;
        }
        tracing::info!("client shut down");
    }
}

fn drop_unroutable(event: &str, correlation: &str) {
    let err = RtcError::UnknownCorrelation(correlation.to_string());
    tracing::debug!(event, error = %err, "message dropped");
}
