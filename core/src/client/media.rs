use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{MediaHandle, TrackKind};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("camera/microphone permission denied")]
    PermissionDenied,
    #[error("media capture unsupported: {0}")]
    Unsupported(String),
}

/// Local capture device. Acquisition failures are surfaced to the user and
/// never retried automatically.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<MediaHandle, MediaError>;
    /// Flip the enabled flag of every track of `kind`; returns the new state.
    fn toggle(&self, kind: TrackKind) -> bool;
}

/// Stand-in capture for headless peers: grants immediately and tracks the
/// enabled flags without producing samples.
#[derive(Debug)]
pub struct SyntheticMedia {
    issued: AtomicU64,
    audio: AtomicBool,
    video: AtomicBool,
}

impl Default for SyntheticMedia {
    fn default() -> Self {
        Self {
            issued: AtomicU64::new(0),
            audio: AtomicBool::new(true),
            video: AtomicBool::new(true),
        }
    }
}

impl SyntheticMedia {
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio.load(Ordering::Relaxed),
            TrackKind::Video => self.video.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl MediaSource for SyntheticMedia {
    async fn acquire(&self) -> Result<MediaHandle, MediaError> {
        let n = self.issued.fetch_add(1, Ordering::Relaxed);
        Ok(MediaHandle::new(format!("synthetic-{n}")))
    }

    fn toggle(&self, kind: TrackKind) -> bool {
        let flag = match kind {
            TrackKind::Audio => &self.audio,
            TrackKind::Video => &self.video,
        };
        !flag.fetch_xor(true, Ordering::Relaxed)
    }
}

/// A device that refuses capture, e.g. when running with `--no-media`.
#[derive(Debug, Default)]
pub struct UnavailableMedia;

#[async_trait]
impl MediaSource for UnavailableMedia {
    async fn acquire(&self) -> Result<MediaHandle, MediaError> {
        Err(MediaError::PermissionDenied)
    }

    fn toggle(&self, _kind: TrackKind) -> bool {
        false
    }
}
