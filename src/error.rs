use thiserror::Error;

/// Failures of the capture, recording and analysis pipeline
///
/// Capture and recording errors are surfaced to the user; estimation errors are
/// absorbed by the analysis loop and only ever logged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Unable to access camera: {0}")]
    DeviceAccess(String),

    #[error("No supported recording format (tried: {})", tried.join(", "))]
    UnsupportedRecording { tried: Vec<String> },

    #[error("Pose estimation failed: {0}")]
    Estimation(String),

    #[error("No active live stream")]
    NoActiveStream,

    #[error("A recording is already in progress")]
    RecordingActive,

    #[error("Invalid recorded clip: {0}")]
    InvalidClip(String),

    #[error("{0} service is no longer running")]
    ServiceClosed(&'static str),
}

impl CaptureError {
    /// Whether the UI should show a notification for this error
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::DeviceAccess(_) | Self::UnsupportedRecording { .. } | Self::InvalidClip(_)
        )
    }

    /// Whether retrying the same operation on the same runtime can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceAccess(_))
    }
}
