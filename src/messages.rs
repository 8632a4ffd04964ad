use crate::error::CaptureError;
use crate::video::{Facing, LiveFeed, Orientation, RecordingArtifact, RecordingState, SourceInfo};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::sync::oneshot;

/// A finalised recording persisted for playback
#[derive(Debug)]
pub struct FinishedRecording {
    pub artifact: RecordingArtifact,
    /// Removed from disk when dropped
    pub file: NamedTempFile,
    /// Playable URL of `file`
    pub url: String,
    /// Number of buffered chunks the artifact was assembled from
    pub chunks: usize,
}

impl FinishedRecording {
    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}

/// Commands for the Recorder service
pub enum RecorderCommand {
    Start {
        feed: LiveFeed,
        reply: oneshot::Sender<Result<(), CaptureError>>,
    },
    Pause,
    Resume,
    Stop(oneshot::Sender<Result<Option<FinishedRecording>>>),
}

/// Recorder state (observable via watch channel)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecorderStatus {
    pub state: RecordingState,
    pub elapsed_seconds: u64,
}

impl Default for RecorderStatus {
    fn default() -> Self {
        Self {
            state: RecordingState::Idle,
            elapsed_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Backward,
    Forward,
}

/// Commands for the Pipeline service
pub enum PipelineCommand {
    GoLive(oneshot::Sender<Result<SourceInfo, CaptureError>>),
    Review(RecordingArtifact, oneshot::Sender<Result<SourceInfo, CaptureError>>),
    RefreshCamera(oneshot::Sender<Result<SourceInfo, CaptureError>>),
    SetFacing(Facing, oneshot::Sender<Result<Option<SourceInfo>, CaptureError>>),
    SetOrientation(Orientation, oneshot::Sender<Result<Option<SourceInfo>, CaptureError>>),
    ReleaseSource(oneshot::Sender<()>),
    StartAnalysis(oneshot::Sender<Result<(), CaptureError>>),
    StopAnalysis,
    Play,
    Pause,
    Seek(SeekDirection),
    StartRecording(oneshot::Sender<Result<()>>),
}
