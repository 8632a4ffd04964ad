use super::analysis::{AnalysisSession, CancelSource};
use super::capture::CaptureManager;
use super::recorder::RecorderHandle;
use crate::classifier::{ClassifierConfig, PhaseTransition, SwingPhase};
use crate::error::CaptureError;
use crate::messages::{PipelineCommand, SeekDirection};
use crate::pose::PoseEstimator;
use crate::video::{
    Facing, Frame, FrameSource, Orientation, RecordingArtifact, SourceId, SourceInfo,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Transitions buffered per subscriber
const TRANSITION_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// How often a frame is pulled from the source
    pub frame_interval: Duration,
    pub seek_step_seconds: f64,
    pub classifier: ClassifierConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            seek_step_seconds: 0.5,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Drives the frame loop for whichever source is current
///
/// This service:
/// - Owns the capture manager, so source switches are serialised
/// - Pulls one frame per tick and advances recorded playback
/// - Runs estimate → classify → overlay while analysis is enabled
/// - Publishes the phase (on change only), the displayed frame and the
///   source snapshot on watch channels
pub struct Pipeline {
    cmd_rx: mpsc::Receiver<PipelineCommand>,
    capture: CaptureManager,
    estimator: Arc<dyn PoseEstimator>,
    recorder: RecorderHandle,
    settings: PipelineSettings,
    cancel: CancelSource,
    analysis: Option<AnalysisSession>,
    last_tick: Option<Instant>,
    phase_tx: watch::Sender<SwingPhase>,
    source_tx: watch::Sender<Option<SourceInfo>>,
    frame_tx: watch::Sender<Option<Arc<Frame>>>,
    transition_tx: broadcast::Sender<PhaseTransition>,
}

impl Pipeline {
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let has_source = self.capture.source().is_some();

            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                _ = ticker.tick(), if has_source => {
                    self.on_tick().await;
                }
            }
        }

        self.cancel.cancel();
        self.analysis = None;
        self.capture.release();
        tracing::debug!("Pipeline service stopped");
    }

    async fn handle_command(&mut self, cmd: PipelineCommand) {
        match cmd {
            PipelineCommand::GoLive(reply) => {
                let previous = self.current_id();
                let result = self.capture.go_live().await;
                self.on_source_changed(previous);
                let _ = reply.send(result);
            }

            PipelineCommand::Review(artifact, reply) => {
                let previous = self.current_id();
                let result = self.capture.review(&artifact);
                self.on_source_changed(previous);
                let _ = reply.send(result);
            }

            PipelineCommand::RefreshCamera(reply) => {
                let previous = self.current_id();
                let result = self.capture.refresh().await;
                self.on_source_changed(previous);
                let _ = reply.send(result);
            }

            PipelineCommand::SetFacing(facing, reply) => {
                let previous = self.current_id();
                let result = self.capture.set_facing(facing).await;
                tracing::info!("Camera facing set to {:?}", self.capture.constraints().facing);
                self.on_source_changed(previous);
                let _ = reply.send(result);
            }

            PipelineCommand::SetOrientation(orientation, reply) => {
                let previous = self.current_id();
                let result = self.capture.set_orientation(orientation).await;
                tracing::info!(
                    "Capture orientation set to {:?}",
                    self.capture.constraints().orientation
                );
                self.on_source_changed(previous);
                let _ = reply.send(result);
            }

            PipelineCommand::ReleaseSource(reply) => {
                let previous = self.current_id();
                self.capture.release();
                self.on_source_changed(previous);
                let _ = reply.send(());
            }

            PipelineCommand::StartAnalysis(reply) => {
                let result = match self.capture.info() {
                    Some(info) => {
                        self.start_session(&info);
                        Ok(())
                    }
                    None => Err(CaptureError::NoActiveStream),
                };
                let _ = reply.send(result);
            }

            PipelineCommand::StopAnalysis => {
                self.cancel.cancel();
                if let Some(session) = self.analysis.take() {
                    tracing::info!(
                        "Analysis of source {:?} stopped at {}",
                        session.source_id(),
                        session.phase().label()
                    );
                }
            }

            PipelineCommand::Play => {
                if let Some(source) = self.capture.source_mut() {
                    if source.is_ended() {
                        tracing::debug!("Playback ended, replaying from the start");
                    }
                    source.play();
                    tracing::debug!("Playback started at {:.2}s", source.current_seconds());
                }
            }

            PipelineCommand::Pause => {
                if let Some(source) = self.capture.source_mut() {
                    if !source.is_paused() {
                        source.pause();
                        tracing::debug!("Playback paused at {:.2}s", source.current_seconds());
                    }
                }
            }

            PipelineCommand::Seek(direction) => {
                let step = match direction {
                    SeekDirection::Backward => -self.settings.seek_step_seconds,
                    SeekDirection::Forward => self.settings.seek_step_seconds,
                };
                if let Some(source) = self.capture.source_mut() {
                    source.seek_by(step);
                    tracing::debug!("Seeked to {:.2}s", source.current_seconds());
                }
            }

            PipelineCommand::StartRecording(reply) => {
                // Subscribe before awaiting so no source borrow is held across the await
                let feed = self
                    .capture
                    .source()
                    .ok_or(CaptureError::NoActiveStream)
                    .and_then(FrameSource::subscribe);
                let result = match feed {
                    Ok(feed) => self.recorder.start_feed(feed).await,
                    Err(e) => Err(e.into()),
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();
        let elapsed = self
            .last_tick
            .replace(now)
            .map(|previous| now - previous)
            .unwrap_or_default();

        let Some(source) = self.capture.source_mut() else {
            return;
        };
        source.advance(elapsed.as_secs_f64());

        // Readiness: nothing to do while paused, ended or stopped
        let Some(frame) = source.next_frame().await else {
            return;
        };
        let position = source.position();

        let outcome = match self.analysis.as_mut() {
            Some(session) => session.process(&frame, position, self.estimator.as_ref()).await,
            None => None,
        };

        match outcome {
            Some(outcome) => {
                if let Some(transition) = outcome.transition {
                    self.publish_phase(transition.to);
                    // Only fails without subscribers
                    let _ = self.transition_tx.send(transition);
                }
                self.frame_tx.send_replace(Some(Arc::new(outcome.overlay)));
            }
            None => {
                self.frame_tx.send_replace(Some(Arc::new(frame)));
            }
        }
    }

    fn current_id(&self) -> Option<SourceId> {
        self.capture.info().map(|info| info.id)
    }

    /// Cancel and rebuild analysis state after the source may have changed
    fn on_source_changed(&mut self, previous: Option<SourceId>) {
        let current = self.capture.info();
        if current.map(|info| info.id) == previous {
            return;
        }

        self.cancel.cancel();
        let was_running = self.analysis.take().is_some();
        self.last_tick = None;
        self.source_tx.send_replace(current);

        match current {
            Some(info) => {
                if was_running {
                    self.start_session(&info);
                } else {
                    self.publish_phase(SwingPhase::Setup);
                }
            }
            None => {
                if was_running {
                    tracing::warn!("Analysis stopped: no active source");
                }
            }
        }
    }

    fn start_session(&mut self, info: &SourceInfo) {
        self.cancel.cancel();
        let classifier = self.settings.classifier.clone();
        let session = AnalysisSession::new(classifier, info, self.cancel.token());
        self.analysis = Some(session);
        self.publish_phase(SwingPhase::Setup);
        tracing::info!("Analysing {:?} source {:?}", info.kind, info.id);
    }

    fn publish_phase(&self, phase: SwingPhase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
    }
}

/// Handle for communicating with the Pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineCommand>,
    cancel: CancelSource,
    recorder: RecorderHandle,
    phase_rx: watch::Receiver<SwingPhase>,
    source_rx: watch::Receiver<Option<SourceInfo>>,
    frame_rx: watch::Receiver<Option<Arc<Frame>>>,
    transition_tx: broadcast::Sender<PhaseTransition>,
}

impl PipelineHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PipelineCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| CaptureError::ServiceClosed("pipeline"))?;
        rx.await
            .map_err(|_| CaptureError::ServiceClosed("pipeline").into())
    }

    async fn send(&self, command: PipelineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CaptureError::ServiceClosed("pipeline").into())
    }

    /// Acquire the camera and make it the current source
    pub async fn go_live(&self) -> Result<SourceInfo> {
        Ok(self.request(PipelineCommand::GoLive).await??)
    }

    /// Load a finished recording as the current source (paused at 0)
    pub async fn review(&self, artifact: RecordingArtifact) -> Result<SourceInfo> {
        Ok(self
            .request(|reply| PipelineCommand::Review(artifact, reply))
            .await??)
    }

    pub async fn refresh_camera(&self) -> Result<SourceInfo> {
        Ok(self.request(PipelineCommand::RefreshCamera).await??)
    }

    /// `None` when no live source needed re-acquiring
    pub async fn set_facing(&self, facing: Facing) -> Result<Option<SourceInfo>> {
        Ok(self
            .request(|reply| PipelineCommand::SetFacing(facing, reply))
            .await??)
    }

    pub async fn set_orientation(&self, orientation: Orientation) -> Result<Option<SourceInfo>> {
        Ok(self
            .request(|reply| PipelineCommand::SetOrientation(orientation, reply))
            .await??)
    }

    pub async fn release_source(&self) -> Result<()> {
        self.request(PipelineCommand::ReleaseSource).await
    }

    pub async fn start_analysis(&self) -> Result<()> {
        Ok(self.request(PipelineCommand::StartAnalysis).await??)
    }

    /// Stop the loop; any estimate already in flight is discarded
    pub async fn stop_analysis(&self) -> Result<()> {
        self.cancel.cancel();
        self.send(PipelineCommand::StopAnalysis).await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(PipelineCommand::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(PipelineCommand::Pause).await
    }

    pub async fn seek(&self, direction: SeekDirection) -> Result<()> {
        self.send(PipelineCommand::Seek(direction)).await
    }

    /// Start recording the current live source
    pub async fn start_recording(&self) -> Result<()> {
        self.request(PipelineCommand::StartRecording).await?
    }

    pub fn recorder(&self) -> &RecorderHandle {
        &self.recorder
    }

    pub fn phase(&self) -> SwingPhase {
        *self.phase_rx.borrow()
    }

    /// Notified on phase transitions only
    pub fn subscribe_phase(&self) -> watch::Receiver<SwingPhase> {
        self.phase_rx.clone()
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<PhaseTransition> {
        self.transition_tx.subscribe()
    }

    pub fn source(&self) -> Option<SourceInfo> {
        *self.source_rx.borrow()
    }

    pub fn subscribe_source(&self) -> watch::Receiver<Option<SourceInfo>> {
        self.source_rx.clone()
    }

    /// Latest displayed frame, with the overlay while analysing
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.frame_rx.clone()
    }
}

/// Spawn a Pipeline service and return its handle
pub fn spawn_pipeline(
    capture: CaptureManager,
    estimator: Arc<dyn PoseEstimator>,
    recorder: RecorderHandle,
    settings: PipelineSettings,
) -> PipelineHandle {
    let (tx, cmd_rx) = mpsc::channel(10);
    let (phase_tx, phase_rx) = watch::channel(SwingPhase::Setup);
    let (source_tx, source_rx) = watch::channel(capture.info());
    let (frame_tx, frame_rx) = watch::channel(None);
    let (transition_tx, _) = broadcast::channel(TRANSITION_CAPACITY);
    let cancel = CancelSource::new();

    let pipeline = Pipeline {
        cmd_rx,
        capture,
        estimator,
        recorder: recorder.clone(),
        settings,
        cancel: cancel.clone(),
        analysis: None,
        last_tick: None,
        phase_tx,
        source_tx,
        frame_tx,
        transition_tx: transition_tx.clone(),
    };
    tokio::spawn(pipeline.run());

    PipelineHandle {
        tx,
        cancel,
        recorder,
        phase_rx,
        source_rx,
        frame_rx,
        transition_tx,
    }
}
