//! Capability interface to the host capture runtime.
//!
//! The core never touches samples or frames. [`MediaTrack`] and
//! [`MediaStream`] are handles: toggling `enabled` or stopping a track is
//! observed by the host runtime that produced it.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::RtcError;
use crate::protocol::MediaKind;

/// What a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

type EndedHook = Box<dyn Fn() + Send + Sync>;

struct TrackInner {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    on_ended: Mutex<Option<EndedHook>>,
}

/// Cheap cloneable handle to one local or remote media track.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                on_ended: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// A disabled track keeps its transport but produces no samples or
    /// frames; this is how mute and camera-off work, with no signaling.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flips `enabled` and returns the new value.
    pub fn toggle_enabled(&self) -> bool {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled);
        enabled
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Registers a hook fired when the host runtime ends the track outside
    /// the session's control (e.g. the browser's "stop sharing" chrome).
    pub fn set_on_ended(&self, hook: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.inner.on_ended.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    pub fn clear_on_ended(&self) {
        if let Ok(mut slot) = self.inner.on_ended.lock() {
            *slot = None;
        }
    }

    /// Called by the host runtime when the track ended on its own. Fires
    /// the registered hook at most once.
    pub fn notify_ended(&self) {
        self.stop();
        let hook = self.inner.on_ended.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// A bundle of tracks from one capture source.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Convenience constructor for capture providers: audio-only for an
    /// audio call, audio + video otherwise.
    pub fn for_media(media: MediaKind) -> Self {
        let mut tracks = vec![MediaTrack::new(TrackKind::Audio)];
        if media == MediaKind::Video {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }
        Self::new(tracks)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn first_video_track(&self) -> Option<&MediaTrack> {
        self.video_tracks().next()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Supplies local capture streams. Implemented by the host runtime.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Camera/microphone capture. Fails with
    /// [`RtcError::MediaAccessDenied`] when the user refuses permission.
    async fn capture(&self, media: MediaKind) -> Result<MediaStream, RtcError>;

    /// Screen capture, a distinct stream from the camera one.
    async fn capture_screen(&self) -> Result<MediaStream, RtcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_enabled() {
        let track = MediaTrack::new(TrackKind::Audio);
        assert!(track.is_enabled());
        assert!(!track.toggle_enabled());
        assert!(track.toggle_enabled());
    }

    #[test]
    fn ended_hook_fires_once() {
        let track = MediaTrack::new(TrackKind::Video);
        let fired = Arc::new(AtomicBool::new(false));
        let seen = fired.clone();
        track.set_on_ended(move || seen.store(true, Ordering::SeqCst));
        track.notify_ended();
        assert!(fired.load(Ordering::SeqCst));
        assert!(track.is_stopped());

        fired.store(false, Ordering::SeqCst);
        track.notify_ended();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn stream_for_audio_has_no_video_track() {
        let stream = MediaStream::for_media(MediaKind::Audio);
        assert_eq!(stream.tracks().len(), 1);
        assert!(stream.first_video_track().is_none());
    }
}
