//! Error taxonomy for the session layer.
//!
//! Only [`RtcError::MediaAccessDenied`] is surfaced to the embedding UI;
//! everything else is logged and swallowed so a session survives lossy,
//! out-of-order or duplicated signaling.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtcError {
    /// Capture permission refused. Aborts the call or join attempt.
    #[error("media capture permission denied")]
    MediaAccessDenied,

    /// No signaling connection and the on-demand reconnect failed. The
    /// message being sent is lost.
    #[error("signaling channel unavailable: {0}")]
    SignalingUnavailable(String),

    /// ICE candidate applied before the remote description was set, or
    /// malformed. Dropped, non-fatal.
    #[error("ICE candidate rejected: {0}")]
    CandidateRejected(String),

    /// Message references a call or room with no live session. Dropped.
    #[error("no live session for correlation id {0}")]
    UnknownCorrelation(String),

    /// A second offer or accept arrived for an already-negotiated
    /// connection. Ignored.
    #[error("duplicate negotiation for an established connection")]
    DuplicateNegotiation,

    /// A direct call is already live; tear it down before dialing again.
    #[error("a call is already in progress")]
    CallInProgress,

    /// Local command addressed a session that does not exist.
    #[error("no such session: {0}")]
    NoSuchSession(String),
}
