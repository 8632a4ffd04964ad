use crate::classifier::{PhaseTransition, SwingPhase};
use crate::config::Config;
use crate::error::CaptureError;
use crate::messages::{FinishedRecording, SeekDirection};
use crate::pose::PoseEstimator;
use crate::services::{
    CaptureManager, PipelineHandle, RecorderHandle, spawn_pipeline, spawn_recorder,
};
use crate::video::session::format_elapsed;
use crate::video::{CaptureConstraints, RawEncoderFactory, SourceInfo, TestPatternDevice};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

/// Extra time allowed for playback to reach the finish
const REVIEW_GRACE: Duration = Duration::from_secs(2);

/// Pause before asking for a denied camera again
const CAMERA_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Records one take from the camera while classifying it live, then reviews
/// the take in playback mode
pub struct App {
    config: Config,
    pipeline: PipelineHandle,
}

impl App {
    pub fn new(config: Config, estimator: Arc<dyn PoseEstimator>) -> Self {
        let recorder = Self::setup_recorder(&config);
        let capture = Self::setup_capture(&config);
        let pipeline = spawn_pipeline(capture, estimator, recorder, config.pipeline_settings());

        Self { config, pipeline }
    }

    pub async fn run(self) -> Result<()> {
        let transitions = tokio::spawn(log_transitions(self.pipeline.subscribe_transitions()));
        let sources = tokio::spawn(log_sources(self.pipeline.subscribe_source()));

        let result = tokio::select! {
            result = self.session() => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                Ok(())
            }
        };

        if let Err(e) = self.pipeline.release_source().await {
            tracing::warn!("Failed to release source: {}", e);
        }
        drop(self.pipeline);
        let _ = transitions.await;
        let _ = sources.await;

        tracing::info!("Swingcam shutdown complete");
        report(result)
    }

    async fn session(&self) -> Result<()> {
        self.apply_camera_settings().await?;
        let take = self.handle_live_take().await?;
        self.handle_review(&take).await
    }

    /// Hand the configured facing and orientation to the capture layer;
    /// nothing is opened while there is no source
    async fn apply_camera_settings(&self) -> Result<()> {
        self.pipeline.set_facing(self.config.facing).await?;
        self.pipeline.set_orientation(self.config.orientation).await?;
        Ok(())
    }

    /// Go live, asking once more if the camera refuses the first time
    async fn acquire_camera(&self) -> Result<SourceInfo> {
        let err = match self.pipeline.go_live().await {
            Ok(source) => return Ok(source),
            Err(e) => e,
        };

        match err.downcast_ref::<CaptureError>() {
            Some(capture_err) if capture_err.is_retryable() => {
                tracing::warn!("Camera unavailable ({}), retrying", capture_err);
                tokio::time::sleep(CAMERA_RETRY_DELAY).await;
                self.pipeline.refresh_camera().await
            }
            _ => Err(err),
        }
    }

    async fn handle_live_take(&self) -> Result<FinishedRecording> {
        let source = self.acquire_camera().await?;
        tracing::info!(
            "Camera live at {}x{}, press Ctrl+C to quit",
            source.size.width,
            source.size.height
        );

        self.pipeline.start_analysis().await?;
        self.pipeline.start_recording().await?;
        self.show_recording_clock().await;

        let status = self.pipeline.recorder().status();
        tracing::info!("Stopping take at {}", format_elapsed(status.elapsed_seconds));
        let take = self
            .pipeline
            .recorder()
            .stop()
            .await?
            .context("Recorder had no take to finish")?;
        tracing::info!("Take saved in {} chunks, playable at {}", take.chunks, take.url);

        Ok(take)
    }

    /// Log the recording badge every second for the configured take length
    async fn show_recording_clock(&self) {
        let mut status_rx = self.pipeline.recorder().subscribe_status();
        let take_length = Duration::from_secs(self.config.take_seconds);

        let _ = tokio::time::timeout(take_length, async {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                tracing::info!(
                    "● REC {} ({:?})",
                    format_elapsed(status.elapsed_seconds),
                    status.state
                );
            }
        })
        .await;
    }

    async fn handle_review(&self, take: &FinishedRecording) -> Result<()> {
        let source = self.pipeline.review(take.artifact.clone()).await?;
        let duration = source.duration_seconds.unwrap_or_default();
        tracing::info!("Reviewing take ({:.1}s)", duration);

        // Analysis already follows the new source; start it anyway in case the
        // live run was stopped
        self.pipeline.start_analysis().await?;
        self.pipeline.play().await?;

        let mut phase_rx = self.pipeline.subscribe_phase();
        let budget = Duration::from_secs_f64(duration.max(0.0)) + REVIEW_GRACE;
        if tokio::time::timeout(budget, phase_rx.wait_for(|p| *p == SwingPhase::FollowThrough))
            .await
            .is_err()
        {
            tracing::warn!("Playback ended before the follow-through");
        }

        // Step back to look at the finish again
        self.pipeline.pause().await?;
        self.pipeline.seek(SeekDirection::Backward).await?;
        self.pipeline.stop_analysis().await?;

        let phase = self.pipeline.phase();
        match self.pipeline.subscribe_frames().borrow().as_deref() {
            Some(frame) => tracing::info!(
                "Review finished in {} on frame {} ({:.2}s)",
                phase.label(),
                frame.index,
                frame.timestamp
            ),
            None => tracing::info!("Review finished in {}", phase.label()),
        }
        Ok(())
    }

    fn setup_recorder(config: &Config) -> RecorderHandle {
        spawn_recorder(
            config.format_preference(),
            Arc::new(RawEncoderFactory),
            config.flush_interval(),
        )
    }

    fn setup_capture(config: &Config) -> CaptureManager {
        let device = TestPatternDevice::new(config.test_pattern_fps, config.capture_size());
        let constraints = CaptureConstraints {
            ideal_size: config.capture_size(),
            ..CaptureConstraints::default()
        };
        CaptureManager::new(Arc::new(device), constraints)
    }
}

/// Capture and recording failures are shown to the user and end the session
/// cleanly; anything else is a defect and is returned
fn report(result: Result<()>) -> Result<()> {
    let Err(err) = result else {
        return Ok(());
    };

    match err.downcast_ref::<CaptureError>() {
        Some(capture_err) if capture_err.is_user_visible() => {
            tracing::error!("{:#}", err);
            Ok(())
        }
        _ => Err(err),
    }
}

async fn log_sources(mut sources: watch::Receiver<Option<SourceInfo>>) {
    while sources.changed().await.is_ok() {
        match *sources.borrow_and_update() {
            Some(info) => tracing::info!(
                "Showing {:?} source {:?} ({}x{})",
                info.kind,
                info.id,
                info.size.width,
                info.size.height
            ),
            None => tracing::info!("No active source"),
        }
    }
}

async fn log_transitions(mut transitions: broadcast::Receiver<PhaseTransition>) {
    loop {
        match transitions.recv().await {
            Ok(transition) => {
                tracing::info!(
                    "{}: {}",
                    transition.to.label(),
                    transition.to.tips().join(" / ")
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} phase transitions", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible_errors_end_the_session_cleanly() {
        assert!(report(Ok(())).is_ok());
        assert!(report(Err(CaptureError::DeviceAccess("denied".into()).into())).is_ok());

        let wrapped = anyhow::Error::from(CaptureError::InvalidClip("bad magic".into()))
            .context("Failed to review take");
        assert!(report(Err(wrapped)).is_ok());
    }

    #[test]
    fn test_defects_are_returned() {
        assert!(report(Err(CaptureError::NoActiveStream.into())).is_err());
        assert!(report(Err(CaptureError::RecordingActive.into())).is_err());
        assert!(report(Err(anyhow::anyhow!("phase watch closed"))).is_err());
    }
}
