//! Meshcall: signaling and session orchestration for real-time calls.
//!
//! Turns a stream of asynchronous, possibly out-of-order or duplicated
//! control events into a consistent lifecycle for 1:1 calls and mesh
//! meeting rooms. Media capture, peer connections, the relay transport and
//! call-log persistence are capability interfaces supplied by the host
//! runtime ([`MediaSource`], [`PeerConnectionFactory`],
//! [`SignalingTransport`], [`CallLogger`]); the crate owns the state
//! machines, the wire protocol and the ordering discipline.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use meshcall::*;
//! # fn capabilities() -> (Arc<dyn SignalingTransport>, Arc<dyn MediaSource>,
//! #                       Arc<dyn PeerConnectionFactory>) { unimplemented!() }
//! # async fn demo() {
//! let (transport, media, peers) = capabilities();
//! let (client, handle, mut events) =
//!     RtcClient::new(RtcConfig::default(), transport, media, peers, Arc::new(NullCallLogger));
//! tokio::spawn(client.run());
//!
//! handle.start_call(42, "ada", MediaKind::Video);
//! while let Some(_event) = events.recv().await {
//!     // drive the UI
//! }
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod journal;
pub mod media;
pub mod peer;
pub mod protocol;
pub mod session;
pub mod signaling;

pub use client::{RtcClient, RtcHandle};
pub use config::RtcConfig;
pub use error::RtcError;
pub use journal::{CallAction, CallJournal, CallLogEntry, CallLogger, NullCallLogger};
pub use media::{MediaSource, MediaStream, MediaTrack, TrackKind};
pub use peer::{
    PeerConnection, PeerConnectionFactory, PeerEvent, PeerEvents, PeerScope, TaggedPeerEvent,
};
pub use protocol::{
    CallId, IceCandidateInit, MediaKind, RoomId, SdpKind, SessionDescription, SignalMessage,
    UserId,
};
pub use session::{CallState, Participant, RoomState, SessionEvent};
pub use signaling::{SignalingChannel, SignalingConnection, SignalingTransport};
