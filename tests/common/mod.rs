//! Shared test doubles: an in-memory relay that routes signaling the way
//! the production relay does, plus recording media / peer / logger fakes.

#![allow(dead_code)]

use async_trait::async_trait;
use meshcall::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct RelayInner {
    clients: HashMap<UserId, mpsc::UnboundedSender<SignalMessage>>,
    usernames: HashMap<UserId, String>,
    rooms: HashMap<RoomId, BTreeSet<UserId>>,
}

/// Routes messages between clients exactly like the relay: `call-user`
/// becomes `incoming-call` with the caller's username filled in, room
/// joins produce a `room-users` snapshot for the joiner and `user-joined`
/// for the incumbents, SDP/ICE messages are forwarded to `target_id` with
/// `sender_id` stamped for room traffic.
#[derive(Default)]
pub struct TestRelay {
    inner: Mutex<RelayInner>,
    relayed: AtomicUsize,
}

impl TestRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(self: &Arc<Self>, user_id: UserId, username: &str) -> Arc<RelayTransport> {
        Arc::new(RelayTransport {
            relay: self.clone(),
            user_id,
            username: username.to_string(),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn is_registered(&self, user_id: UserId) -> bool {
        self.inner.lock().unwrap().clients.contains_key(&user_id)
    }

    /// Total messages received from clients so far.
    pub fn relayed_count(&self) -> usize {
        self.relayed.load(Ordering::SeqCst)
    }

    /// Pushes a message straight into one client's inbound queue, as a
    /// relay-originated event (or a duplicated / stray delivery).
    pub fn deliver_to(&self, user_id: UserId, message: SignalMessage) {
        let inner = self.inner.lock().unwrap();
        deliver(&inner, user_id, message);
    }

    fn route(&self, from: UserId, message: SignalMessage) {
        self.relayed.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        match message {
            SignalMessage::CallUser {
                target_id,
                call_id,
                media,
            } => {
                let from_username = inner.usernames.get(&from).cloned().unwrap_or_default();
                deliver(
                    &inner,
                    target_id,
                    SignalMessage::IncomingCall {
                        call_id,
                        from_id: from,
                        from_username,
                        media,
                    },
                );
            }
            SignalMessage::AcceptCall { target_id, call_id } => {
                deliver(&inner, target_id, SignalMessage::AcceptCall { target_id, call_id });
            }
            SignalMessage::RejectCall { target_id, call_id } => {
                deliver(&inner, target_id, SignalMessage::RejectCall { target_id, call_id });
            }
            SignalMessage::EndCall { target_id, call_id } => {
                deliver(&inner, target_id, SignalMessage::EndCall { target_id, call_id });
            }
            SignalMessage::Offer {
                target_id,
                call_id,
                room_id,
                sdp,
                ..
            } => {
                if let Some(target) = target_id {
                    let sender_id = room_id.map(|_| from);
                    deliver(
                        &inner,
                        target,
                        SignalMessage::Offer {
                            target_id,
                            call_id,
                            room_id,
                            sender_id,
                            sdp,
                        },
                    );
                }
            }
            SignalMessage::Answer {
                target_id,
                call_id,
                room_id,
                sdp,
                ..
            } => {
                if let Some(target) = target_id {
                    let sender_id = room_id.map(|_| from);
                    deliver(
                        &inner,
                        target,
                        SignalMessage::Answer {
                            target_id,
                            call_id,
                            room_id,
                            sender_id,
                            sdp,
                        },
                    );
                }
            }
            SignalMessage::IceCandidate {
                target_id,
                call_id,
                room_id,
                candidate,
                ..
            } => {
                if let Some(target) = target_id {
                    let sender_id = room_id.map(|_| from);
                    deliver(
                        &inner,
                        target,
                        SignalMessage::IceCandidate {
                            target_id,
                            call_id,
                            room_id,
                            sender_id,
                            candidate,
                        },
                    );
                }
            }
            SignalMessage::JoinRoom { room_id } => {
                let existing: Vec<UserId> = {
                    let members = inner.rooms.entry(room_id).or_default();
                    let existing = members.iter().copied().collect();
                    members.insert(from);
                    existing
                };
                let username = inner.usernames.get(&from).cloned().unwrap_or_default();
                deliver(
                    &inner,
                    from,
                    SignalMessage::RoomUsers {
                        space_id: room_id,
                        users: existing.clone(),
                    },
                );
                for user in existing {
                    deliver(
                        &inner,
                        user,
                        SignalMessage::UserJoined {
                            user_id: from,
                            username: username.clone(),
                        },
                    );
                }
            }
            SignalMessage::LeaveRoom { room_id } => {
                let remaining: Vec<UserId> = match inner.rooms.get_mut(&room_id) {
                    Some(members) => {
                        members.remove(&from);
                        members.iter().copied().collect()
                    }
                    None => Vec::new(),
                };
                for user in remaining {
                    deliver(&inner, user, SignalMessage::UserLeft { user_id: from });
                }
            }
            // Relay-originated kinds; clients never send these.
            _ => {}
        }
    }
}

fn deliver(inner: &RelayInner, to: UserId, message: SignalMessage) {
    if let Some(tx) = inner.clients.get(&to) {
        let _ = tx.send(message);
    }
}

pub struct RelayTransport {
    relay: Arc<TestRelay>,
    user_id: UserId,
    username: String,
    pub connects: AtomicUsize,
}

#[async_trait]
impl SignalingTransport for RelayTransport {
    async fn connect(
        &self,
        inbound: mpsc::UnboundedSender<SignalMessage>,
    ) -> Result<Arc<dyn SignalingConnection>, RtcError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.relay.inner.lock().unwrap();
        inner.clients.insert(self.user_id, inbound);
        inner.usernames.insert(self.user_id, self.username.clone());
        Ok(Arc::new(RelayConnection {
            relay: self.relay.clone(),
            user_id: self.user_id,
        }))
    }
}

struct RelayConnection {
    relay: Arc<TestRelay>,
    user_id: UserId,
}

#[async_trait]
impl SignalingConnection for RelayConnection {
    async fn send(&self, message: SignalMessage) -> Result<(), RtcError> {
        self.relay.route(self.user_id, message);
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// Capture source recording every acquisition; flip `deny` to simulate a
/// refused permission prompt.
#[derive(Default)]
pub struct MockMedia {
    pub deny: AtomicBool,
    captures: Mutex<Vec<MediaKind>>,
    streams: Mutex<Vec<MediaStream>>,
    screen_streams: Mutex<Vec<MediaStream>>,
}

impl MockMedia {
    pub fn capture_count(&self) -> usize {
        self.captures.lock().unwrap().len()
    }

    pub fn stream(&self, index: usize) -> MediaStream {
        self.streams.lock().unwrap()[index].clone()
    }

    pub fn screen_stream(&self, index: usize) -> MediaStream {
        self.screen_streams.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl MediaSource for MockMedia {
    async fn capture(&self, media: MediaKind) -> Result<MediaStream, RtcError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(RtcError::MediaAccessDenied);
        }
        let stream = MediaStream::for_media(media);
        self.captures.lock().unwrap().push(media);
        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }

    async fn capture_screen(&self) -> Result<MediaStream, RtcError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(RtcError::MediaAccessDenied);
        }
        let stream = MediaStream::new(vec![MediaTrack::new(TrackKind::Video)]);
        self.screen_streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }
}

/// Scripted negotiation engine. `set_remote_description` doubles as the
/// "negotiation complete" point and emits a remote stream, so tests can
/// synchronize on `SessionEvent::RemoteStream`.
pub struct MockPeer {
    events: PeerEvents,
    offers: AtomicUsize,
    answers: AtomicUsize,
    remote_desc: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidateInit>>,
    tracks: Mutex<Vec<MediaTrack>>,
    replaced: Mutex<Vec<MediaTrack>>,
    closed: AtomicBool,
}

impl MockPeer {
    pub fn scope(&self) -> PeerScope {
        self.events.scope().clone()
    }

    pub fn offer_count(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn answer_count(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.lock().unwrap().len()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    pub fn replaced_tracks(&self) -> Vec<MediaTrack> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulates the engine gathering a local candidate.
    pub fn gather_candidate(&self, candidate: &str) {
        self.events.ice_candidate(IceCandidateInit::new(candidate));
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn create_offer(&self) -> Result<SessionDescription, RtcError> {
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("v=offer-{n}")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        let n = self.answers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::answer(format!("v=answer-{n}")))
    }

    async fn set_local_description(&self, _desc: SessionDescription) -> Result<(), RtcError> {
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        *self.remote_desc.lock().unwrap() = Some(desc);
        self.events
            .remote_stream(MediaStream::new(vec![MediaTrack::new(TrackKind::Video)]));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), RtcError> {
        if self.remote_desc.lock().unwrap().is_none() {
            return Err(RtcError::CandidateRejected(
                "remote description not set".into(),
            ));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    fn add_track(&self, track: MediaTrack) {
        self.tracks.lock().unwrap().push(track);
    }

    fn replace_video_track(&self, track: MediaTrack) {
        self.replaced.lock().unwrap().push(track);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockPeerFactory {
    created: Mutex<Vec<Arc<MockPeer>>>,
}

impl MockPeerFactory {
    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn peer(&self, index: usize) -> Arc<MockPeer> {
        self.created.lock().unwrap()[index].clone()
    }

    pub fn peer_for(&self, scope: &PeerScope) -> Option<Arc<MockPeer>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|peer| peer.scope() == *scope)
            .cloned()
    }
}

impl PeerConnectionFactory for MockPeerFactory {
    fn create(&self, events: PeerEvents) -> Arc<dyn PeerConnection> {
        let peer = Arc::new(MockPeer {
            events,
            offers: AtomicUsize::new(0),
            answers: AtomicUsize::new(0),
            remote_desc: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            replaced: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.created.lock().unwrap().push(peer.clone());
        peer
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<CallLogEntry>>,
}

impl RecordingLogger {
    pub fn actions(&self) -> Vec<CallAction> {
        self.entries.lock().unwrap().iter().map(|e| e.action).collect()
    }

    pub fn entries(&self) -> Vec<CallLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallLogger for RecordingLogger {
    async fn record(&self, entry: CallLogEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

/// One fully wired client running on its own dispatcher task.
pub struct TestClient {
    pub user_id: UserId,
    pub handle: RtcHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub media: Arc<MockMedia>,
    pub peers: Arc<MockPeerFactory>,
    pub logger: Arc<RecordingLogger>,
}

impl TestClient {
    pub async fn spawn(relay: &Arc<TestRelay>, user_id: UserId, username: &str) -> Self {
        Self::spawn_with_config(relay, user_id, username, RtcConfig::default()).await
    }

    pub async fn spawn_with_config(
        relay: &Arc<TestRelay>,
        user_id: UserId,
        username: &str,
        config: RtcConfig,
    ) -> Self {
        init_tracing();
        let media = Arc::new(MockMedia::default());
        let peers = Arc::new(MockPeerFactory::default());
        let logger = Arc::new(RecordingLogger::default());
        let transport = relay.transport(user_id, username);
        let (client, handle, events) = RtcClient::new(
            config,
            transport,
            media.clone(),
            peers.clone(),
            logger.clone(),
        );
        tokio::spawn(client.run());
        handle.connect();
        let relay = relay.clone();
        wait_until(move || relay.is_registered(user_id)).await;
        Self {
            user_id,
            handle,
            events,
            media,
            peers,
            logger,
        }
    }

    /// Waits for the next event matching `pred`, discarding everything
    /// else on the way.
    pub async fn expect_event(
        &mut self,
        what: &str,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), self.events.recv()).await {
                Ok(Some(event)) if pred(&event) => return event,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("event stream closed while waiting for {what}"),
                Err(_) => panic!("timed out waiting for {what}"),
            }
        }
    }
}

/// Honours `RUST_LOG` when debugging a failing flow.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Polls `cond` until it holds; panics after ~2.5 seconds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
