use super::device::CaptureStream;
use super::encoder::DecodedClip;
use super::frame::{Frame, FrameSize, PlaybackPosition};
use crate::error::CaptureError;
use serde::Serialize;
use tokio::sync::broadcast;

/// Frames buffered per live-feed subscriber before it starts lagging
const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    Live,
    Recorded,
}

/// Identity of a frame source; a new id is issued on every acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceId(pub u64);

/// Snapshot of a source for downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceInfo {
    pub id: SourceId,
    pub kind: SourceKind,
    pub size: FrameSize,
    pub duration_seconds: Option<f64>,
}

enum Backend {
    Live {
        stream: Box<dyn CaptureStream>,
        feed: broadcast::Sender<Frame>,
        current_seconds: f64,
    },
    Recorded(Playback),
    Released,
}

struct Playback {
    frames: Vec<Frame>,
    duration_seconds: f64,
    current_seconds: f64,
    paused: bool,
    ended: bool,
}

impl Playback {
    fn frame_at(&self, seconds: f64) -> Option<&Frame> {
        // Frames are sorted by timestamp; show the last one already presented
        let upcoming = self.frames.partition_point(|f| f.timestamp <= seconds);
        self.frames.get(upcoming.saturating_sub(1))
    }
}

/// Subscription to the frames pulled from a live source
#[derive(Debug)]
pub struct LiveFeed {
    pub frames: broadcast::Receiver<Frame>,
    pub size: FrameSize,
}

/// A live camera stream or a recorded clip behind one interface
pub struct FrameSource {
    id: SourceId,
    size: FrameSize,
    backend: Backend,
}

impl FrameSource {
    /// Wrap a live stream that has already signalled ready
    pub fn live(id: SourceId, size: FrameSize, stream: Box<dyn CaptureStream>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            id,
            size,
            backend: Backend::Live {
                stream,
                feed,
                current_seconds: 0.0,
            },
        }
    }

    /// Build a paused playback source at position zero
    pub fn recorded(id: SourceId, clip: DecodedClip) -> Result<Self, CaptureError> {
        let DecodedClip {
            size,
            mut frames,
            duration_seconds,
        } = clip;

        if frames.is_empty() {
            return Err(CaptureError::InvalidClip("clip contains no frames".into()));
        }
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        Ok(Self {
            id,
            size,
            backend: Backend::Recorded(Playback {
                frames,
                duration_seconds: duration_seconds.max(0.0),
                current_seconds: 0.0,
                paused: true,
                ended: false,
            }),
        })
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    /// `None` once released
    pub fn kind(&self) -> Option<SourceKind> {
        match self.backend {
            Backend::Live { .. } => Some(SourceKind::Live),
            Backend::Recorded(_) => Some(SourceKind::Recorded),
            Backend::Released => None,
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn info(&self) -> Option<SourceInfo> {
        Some(SourceInfo {
            id: self.id,
            kind: self.kind()?,
            size: self.size,
            duration_seconds: self.duration_seconds(),
        })
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match &self.backend {
            Backend::Recorded(playback) => Some(playback.duration_seconds),
            _ => None,
        }
    }

    pub fn current_seconds(&self) -> f64 {
        match &self.backend {
            Backend::Live { current_seconds, .. } => *current_seconds,
            Backend::Recorded(playback) => playback.current_seconds,
            Backend::Released => 0.0,
        }
    }

    pub fn position(&self) -> PlaybackPosition {
        match self.duration_seconds() {
            Some(duration) => PlaybackPosition::recorded(self.current_seconds(), duration),
            None => PlaybackPosition::live(self.current_seconds()),
        }
    }

    pub fn is_paused(&self) -> bool {
        match &self.backend {
            Backend::Live { .. } => false,
            Backend::Recorded(playback) => playback.paused,
            Backend::Released => true,
        }
    }

    pub fn is_ended(&self) -> bool {
        match &self.backend {
            Backend::Live { stream, .. } => !stream.is_active(),
            Backend::Recorded(playback) => playback.ended,
            Backend::Released => true,
        }
    }

    /// Subscribe to every frame pulled from a live source
    pub fn subscribe(&self) -> Result<LiveFeed, CaptureError> {
        match &self.backend {
            Backend::Live { feed, stream, .. } if stream.is_active() => Ok(LiveFeed {
                frames: feed.subscribe(),
                size: self.size,
            }),
            _ => Err(CaptureError::NoActiveStream),
        }
    }

    /// Next decodable frame, or `None` when nothing can be shown right now
    /// (paused or ended playback, stopped stream)
    pub async fn next_frame(&mut self) -> Option<Frame> {
        match &mut self.backend {
            Backend::Live {
                stream,
                feed,
                current_seconds,
            } => {
                let frame = stream.next_frame().await?;
                *current_seconds = frame.timestamp;
                if feed.receiver_count() > 0 {
                    // Only fails when every subscriber is gone
                    let _ = feed.send(frame.clone());
                }
                Some(frame)
            }
            Backend::Recorded(playback) => {
                if playback.paused || playback.ended {
                    return None;
                }
                playback.frame_at(playback.current_seconds).cloned()
            }
            Backend::Released => None,
        }
    }

    /// Advance the playback clock of a playing recorded source
    pub fn advance(&mut self, seconds: f64) {
        if let Backend::Recorded(playback) = &mut self.backend {
            if playback.paused || playback.ended || seconds <= 0.0 {
                return;
            }
            playback.current_seconds += seconds;
            if playback.current_seconds >= playback.duration_seconds {
                playback.current_seconds = playback.duration_seconds;
                playback.ended = true;
                playback.paused = true;
                tracing::debug!("Playback reached the end of source {:?}", self.id);
            }
        }
    }

    pub fn play(&mut self) {
        if let Backend::Recorded(playback) = &mut self.backend {
            if playback.ended {
                playback.current_seconds = 0.0;
                playback.ended = false;
            }
            playback.paused = false;
        }
    }

    pub fn pause(&mut self) {
        if let Backend::Recorded(playback) = &mut self.backend {
            playback.paused = true;
        }
    }

    /// Jump to `seconds`, clamped to `[0, duration]`
    pub fn seek(&mut self, seconds: f64) {
        if let Backend::Recorded(playback) = &mut self.backend {
            let target = if seconds.is_nan() { 0.0 } else { seconds };
            playback.current_seconds = target.clamp(0.0, playback.duration_seconds);
            playback.ended = playback.current_seconds >= playback.duration_seconds;
        }
    }

    /// Move the playback position by a signed offset
    pub fn seek_by(&mut self, offset_seconds: f64) {
        let target = self.current_seconds() + offset_seconds;
        self.seek(target);
    }

    /// Stop all live tracks or detach the recorded clip
    pub fn release(&mut self) {
        match std::mem::replace(&mut self.backend, Backend::Released) {
            Backend::Live { mut stream, .. } => {
                stream.stop();
                tracing::info!("Released live source {:?}", self.id);
            }
            Backend::Recorded(_) => tracing::info!("Released recorded source {:?}", self.id),
            Backend::Released => {}
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}
