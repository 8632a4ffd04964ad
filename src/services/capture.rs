use crate::error::CaptureError;
use crate::video::encoder::RAW_MIME_TYPE;
use crate::video::{
    CaptureConstraints, CaptureDevice, Facing, FrameSource, Orientation, RecordingArtifact,
    SourceId, SourceInfo, SourceKind, decode_raw,
};
use std::sync::Arc;

/// Owns the current frame source and the only live capture handle
///
/// Every acquisition releases the previous source first, so at most one
/// camera stream is open at any time.
pub struct CaptureManager {
    device: Arc<dyn CaptureDevice>,
    constraints: CaptureConstraints,
    source: Option<FrameSource>,
    next_id: u64,
}

impl CaptureManager {
    pub fn new(device: Arc<dyn CaptureDevice>, constraints: CaptureConstraints) -> Self {
        Self {
            device,
            constraints,
            source: None,
            next_id: 1,
        }
    }

    pub fn constraints(&self) -> CaptureConstraints {
        self.constraints
    }

    pub fn source(&self) -> Option<&FrameSource> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut FrameSource> {
        self.source.as_mut()
    }

    pub fn info(&self) -> Option<SourceInfo> {
        self.source.as_ref().and_then(FrameSource::info)
    }

    pub fn is_live(&self) -> bool {
        self.info().map(|i| i.kind) == Some(SourceKind::Live)
    }

    fn issue_id(&mut self) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Acquire a fresh live stream with the current constraints
    ///
    /// The previous source is released before the device is opened; on
    /// failure no source remains.
    pub async fn go_live(&mut self) -> Result<SourceInfo, CaptureError> {
        self.release();

        let mut stream = self.device.open(&self.constraints).await.inspect_err(|e| {
            tracing::error!("Error accessing camera: {}", e);
        })?;

        let size = match stream.ready().await {
            Ok(size) => size,
            Err(e) => {
                stream.stop();
                tracing::error!("Camera never became ready: {}", e);
                return Err(e);
            }
        };

        let id = self.issue_id();
        let source = FrameSource::live(id, size, stream);
        tracing::info!(
            "Live source {:?} ready at {}x{} ({:?}, {:?})",
            id,
            size.width,
            size.height,
            self.constraints.facing,
            self.constraints.orientation
        );
        Ok(self.install(source))
    }

    /// Switch to playback of a finished recording
    ///
    /// The artifact is decoded before anything is released, so a bad artifact
    /// leaves the current source running.
    pub fn review(&mut self, artifact: &RecordingArtifact) -> Result<SourceInfo, CaptureError> {
        if artifact.mime_type != RAW_MIME_TYPE {
            return Err(CaptureError::InvalidClip(format!(
                "cannot decode {}",
                artifact.mime_type
            )));
        }
        let clip = decode_raw(&artifact.data)?;

        self.release();
        let id = self.issue_id();
        let source = FrameSource::recorded(id, clip)?;
        tracing::info!(
            "Recorded source {:?} loaded: {} bytes, {:.2}s",
            id,
            artifact.data.len(),
            source.duration_seconds().unwrap_or_default()
        );
        Ok(self.install(source))
    }

    /// Re-acquire the camera (manual refresh)
    pub async fn refresh(&mut self) -> Result<SourceInfo, CaptureError> {
        self.go_live().await
    }

    /// Change camera facing; re-acquires only while live
    pub async fn set_facing(&mut self, facing: Facing) -> Result<Option<SourceInfo>, CaptureError> {
        self.constraints.facing = facing;
        self.reacquire_if_live().await
    }

    /// Change capture orientation; re-acquires only while live
    pub async fn set_orientation(
        &mut self,
        orientation: Orientation,
    ) -> Result<Option<SourceInfo>, CaptureError> {
        self.constraints.orientation = orientation;
        self.reacquire_if_live().await
    }

    async fn reacquire_if_live(&mut self) -> Result<Option<SourceInfo>, CaptureError> {
        if !self.is_live() {
            return Ok(None);
        }
        self.go_live().await.map(Some)
    }

    /// Release whatever source is active
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }

    fn install(&mut self, source: FrameSource) -> SourceInfo {
        debug_assert!(self.source.is_none());
        let info = SourceInfo {
            id: source.id(),
            kind: source.kind().unwrap_or(SourceKind::Recorded),
            size: source.size(),
            duration_seconds: source.duration_seconds(),
        };
        self.source = Some(source);
        info
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::device::mock::MockDevice;
    use crate::video::encoder::RawEncoder;
    use crate::video::{Frame, FrameSize, VideoEncoder};
    use std::sync::atomic::Ordering;

    fn manager(device: &MockDevice) -> CaptureManager {
        CaptureManager::new(Arc::new(device.clone()), CaptureConstraints::default())
    }

    fn artifact() -> RecordingArtifact {
        let size = FrameSize::new(2, 2);
        let mut encoder = RawEncoder::new(size);
        for i in 0..3 {
            encoder
                .write_frame(&Frame::filled(i, i as f64 / 30.0, size, [0; 4]))
                .unwrap();
        }
        let mut data = encoder.flush();
        data.extend(encoder.finish().unwrap());
        RecordingArtifact {
            data,
            mime_type: RAW_MIME_TYPE.to_string(),
        }
    }

    #[tokio::test]
    async fn test_exactly_one_handle_across_switches() {
        let device = MockDevice::default();
        let mut capture = manager(&device);

        let first = capture.go_live().await.unwrap();
        assert_eq!(first.kind, SourceKind::Live);
        assert_eq!(device.open_handles(), 1);

        let refreshed = capture.refresh().await.unwrap();
        assert_ne!(refreshed.id, first.id);
        assert_eq!(device.open_handles(), 1);

        capture.set_facing(Facing::User).await.unwrap().unwrap();
        assert_eq!(device.open_handles(), 1);

        let portrait = capture.set_orientation(Orientation::Portrait).await.unwrap().unwrap();
        assert_eq!(portrait.size, FrameSize::new(9, 16));
        assert_eq!(device.open_handles(), 1);

        let recorded = capture.review(&artifact()).unwrap();
        assert_eq!(recorded.kind, SourceKind::Recorded);
        assert_eq!(device.open_handles(), 0);

        capture.go_live().await.unwrap();
        assert_eq!(device.open_handles(), 1);
        assert_eq!(device.total_opens(), 5);

        drop(capture);
        assert_eq!(device.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_settings_change_while_recorded_does_not_open_camera() {
        let device = MockDevice::default();
        let mut capture = manager(&device);
        capture.review(&artifact()).unwrap();

        assert_eq!(capture.set_facing(Facing::User).await.unwrap(), None);
        assert_eq!(capture.constraints().facing, Facing::User);
        assert_eq!(device.total_opens(), 0);
    }

    #[tokio::test]
    async fn test_denied_camera_leaves_no_handle() {
        let device = MockDevice::default();
        let mut capture = manager(&device);
        capture.go_live().await.unwrap();

        device.deny.store(true, Ordering::SeqCst);
        let err = capture.refresh().await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceAccess(_)));
        assert!(err.is_retryable());
        assert_eq!(device.open_handles(), 0);
        assert!(capture.info().is_none());
    }

    #[tokio::test]
    async fn test_bad_artifact_keeps_current_source() {
        let device = MockDevice::default();
        let mut capture = manager(&device);
        let live = capture.go_live().await.unwrap();

        let webm = RecordingArtifact {
            data: vec![1, 2, 3],
            mime_type: "video/webm".into(),
        };
        assert!(matches!(capture.review(&webm), Err(CaptureError::InvalidClip(_))));

        let corrupt = RecordingArtifact {
            data: vec![1, 2, 3],
            mime_type: RAW_MIME_TYPE.into(),
        };
        assert!(matches!(capture.review(&corrupt), Err(CaptureError::InvalidClip(_))));

        assert_eq!(capture.info().map(|i| i.id), Some(live.id));
        assert_eq!(device.open_handles(), 1);
    }
}
