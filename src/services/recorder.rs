use crate::error::CaptureError;
use crate::messages::{FinishedRecording, RecorderCommand, RecorderStatus};
use crate::video::{
    EncoderFactory, FormatPreference, Frame, FrameSource, LiveFeed, RecordingArtifact,
    RecordingSession, RecordingState, SourceKind,
};
use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};

/// Coordinates live capture and encoding of one take at a time
///
/// This service:
/// - Negotiates an encoder when a take starts
/// - Receives live frames from the source's feed
/// - Flushes encoded output into chunks on a fixed interval
/// - Counts elapsed seconds while recording (not while paused)
/// - Finalises the take into a temp file on stop, or as soon as the source
///   behind the feed goes away
pub struct Recorder {
    cmd_rx: mpsc::Receiver<RecorderCommand>,
    status_tx: watch::Sender<RecorderStatus>,
    formats: FormatPreference,
    encoders: Arc<dyn EncoderFactory>,
    flush_interval: Duration,
    session: RecordingSession,
    feed: Option<broadcast::Receiver<Frame>>,
    /// Take finalised after its feed closed, handed out by the next stop
    finished: Option<FinishedRecording>,
}

impl Recorder {
    pub fn new(
        cmd_rx: mpsc::Receiver<RecorderCommand>,
        status_tx: watch::Sender<RecorderStatus>,
        formats: FormatPreference,
        encoders: Arc<dyn EncoderFactory>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            cmd_rx,
            status_tx,
            formats,
            encoders,
            flush_interval,
            session: RecordingSession::new(),
            feed: None,
            finished: None,
        }
    }

    pub async fn run(mut self) {
        let mut flush_timer = ticker(self.flush_interval);
        let mut clock = ticker(Duration::from_secs(1));

        loop {
            let recording = self.session.state() == RecordingState::Recording;

            tokio::select! {
                // Handle commands from the pipeline / UI
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd, &mut flush_timer, &mut clock).await,
                    None => break,
                },

                // Frames keep being received while paused so the feed never lags;
                // the session drops them
                Some(received) = next_feed_frame(&mut self.feed), if self.session.is_active() => {
                    self.handle_feed(received).await;
                }

                _ = flush_timer.tick(), if recording => {
                    self.session.flush();
                }

                _ = clock.tick(), if recording => {
                    self.session.tick_second();
                    self.publish_status();
                }
            }
        }

        self.feed = None;
        tracing::debug!("Recorder service stopped");
    }

    async fn handle_command(
        &mut self,
        cmd: RecorderCommand,
        flush_timer: &mut Interval,
        clock: &mut Interval,
    ) {
        match cmd {
            RecorderCommand::Start { feed, reply } => {
                let result = self.session.start(
                    SourceKind::Live,
                    feed.size,
                    self.encoders.as_ref(),
                    &self.formats,
                );
                if result.is_ok() {
                    if let Some(unclaimed) = self.finished.take() {
                        tracing::warn!("Discarding unclaimed take at {}", unclaimed.url);
                    }
                    self.feed = Some(feed.frames);
                    flush_timer.reset();
                    clock.reset();
                    tracing::info!(
                        "Recording started ({})",
                        self.session.mime_type().unwrap_or("unknown format")
                    );
                    self.publish_status();
                }
                let _ = reply.send(result);
            }

            RecorderCommand::Pause => {
                if self.session.state() == RecordingState::Recording {
                    self.session.pause();
                    tracing::info!("Recording paused at {}s", self.session.elapsed_seconds());
                    self.publish_status();
                }
            }

            RecorderCommand::Resume => {
                if self.session.state() == RecordingState::Paused {
                    self.session.resume();
                    flush_timer.reset();
                    clock.reset();
                    tracing::info!("Recording resumed");
                    self.publish_status();
                }
            }

            RecorderCommand::Stop(reply) => {
                let _ = reply.send(self.finish().await);
            }
        }
    }

    async fn handle_feed(&mut self, received: Result<Frame, RecvError>) {
        match received {
            Ok(frame) => {
                if let Err(e) = self.session.write_frame(&frame) {
                    tracing::error!("Failed to encode frame {}: {}", frame.index, e);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Recorder fell behind, {} frames dropped", skipped);
            }
            Err(RecvError::Closed) => {
                // The source was released or replaced; a take never outlives it
                tracing::info!("Live feed closed, finalising the take");
                self.feed = None;
                match self.finish().await {
                    Ok(finished) => self.finished = finished,
                    Err(e) => tracing::error!("Failed to finalise take: {}", e),
                }
            }
        }
    }

    async fn finish(&mut self) -> Result<Option<FinishedRecording>> {
        if let Some(finished) = self.finished.take() {
            return Ok(Some(finished));
        }

        // Drain any frames still buffered in the feed
        if let Some(mut feed) = self.feed.take() {
            loop {
                match feed.try_recv() {
                    Ok(frame) => self.session.write_frame(&frame)?,
                    Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                        tracing::warn!("{} frames dropped before stop", skipped);
                    }
                    Err(_) => break,
                }
            }
        }

        let artifact = match self.session.stop()? {
            Some(artifact) => artifact,
            None => {
                tracing::debug!("Stop ignored, no recording in progress");
                return Ok(None);
            }
        };
        self.publish_status();

        let chunks = self.session.chunks().len();
        tracing::info!(
            "Recording stopped: {} bytes in {} chunks after {}s",
            artifact.data.len(),
            chunks,
            self.session.elapsed_seconds()
        );

        let finished = tokio::task::spawn_blocking(move || persist(artifact, chunks))
            .await
            .context("spawn_blocking failed")??;
        tracing::info!("Recording saved to: {:?}", finished.file.path());

        Ok(Some(finished))
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(RecorderStatus {
            state: self.session.state(),
            elapsed_seconds: self.session.elapsed_seconds(),
        });
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_feed_frame(
    feed: &mut Option<broadcast::Receiver<Frame>>,
) -> Option<Result<Frame, RecvError>> {
    match feed {
        Some(rx) => Some(rx.recv().await),
        None => None,
    }
}

/// File extension for a negotiated mime type
fn file_extension(mime_type: &str) -> &'static str {
    let container = mime_type.split(';').next().unwrap_or_default().trim();
    match container {
        "video/webm" => ".webm",
        "video/mp4" => ".mp4",
        crate::video::encoder::RAW_MIME_TYPE => ".swcr",
        _ => ".bin",
    }
}

fn persist(artifact: RecordingArtifact, chunks: usize) -> Result<FinishedRecording> {
    let mut file = tempfile::Builder::new()
        .prefix("swingcam-")
        .suffix(file_extension(&artifact.mime_type))
        .tempfile()
        .context("Failed to create temp file")?;

    file.write_all(&artifact.data)
        .context("Failed to write recording")?;
    file.flush().context("Failed to flush recording")?;

    let url = format!("file://{}", file.path().display());
    Ok(FinishedRecording {
        artifact,
        file,
        url,
        chunks,
    })
}

/// Handle for communicating with the Recorder
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderCommand>,
    status_rx: watch::Receiver<RecorderStatus>,
}

impl RecorderHandle {
    pub fn new(
        tx: mpsc::Sender<RecorderCommand>,
        status_rx: watch::Receiver<RecorderStatus>,
    ) -> Self {
        Self { tx, status_rx }
    }

    /// Start a take from a live source
    ///
    /// Fails with `NoActiveStream` before anything is sent when the source is
    /// not live.
    pub async fn start(&self, source: &FrameSource) -> Result<()> {
        let feed = source.subscribe()?;
        self.start_feed(feed).await
    }

    /// Start a take from an existing live-feed subscription
    pub async fn start_feed(&self, feed: LiveFeed) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RecorderCommand::Start { feed, reply })
            .await
            .map_err(|_| CaptureError::ServiceClosed("recorder"))?;

        rx.await
            .map_err(|_| CaptureError::ServiceClosed("recorder"))?
            .map_err(Into::into)
    }

    pub async fn pause(&self) -> Result<()> {
        self.tx
            .send(RecorderCommand::Pause)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send pause command: {}", e))
    }

    pub async fn resume(&self) -> Result<()> {
        self.tx
            .send(RecorderCommand::Resume)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send resume command: {}", e))
    }

    /// Finalise the take; `None` if nothing was being recorded
    ///
    /// A take cut short because its source went away is returned here once.
    pub async fn stop(&self) -> Result<Option<FinishedRecording>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RecorderCommand::Stop(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send stop command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive stop response: {}", e))?
    }

    pub fn status(&self) -> RecorderStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RecorderStatus> {
        self.status_rx.clone()
    }
}

/// Spawn a Recorder service and return its handle
pub fn spawn_recorder(
    formats: FormatPreference,
    encoders: Arc<dyn EncoderFactory>,
    flush_interval: Duration,
) -> RecorderHandle {
    let (tx, rx) = mpsc::channel(10);
    let (status_tx, status_rx) = watch::channel(RecorderStatus::default());
    let recorder = Recorder::new(rx, status_tx, formats, encoders, flush_interval);
    tokio::spawn(recorder.run());
    RecorderHandle::new(tx, status_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::device::mock::MockStream;
    use crate::video::encoder::{DecodedClip, RAW_MIME_TYPE, RawEncoderFactory};
    use crate::video::{FrameSize, SourceId, decode_raw};

    fn handle() -> RecorderHandle {
        spawn_recorder(
            FormatPreference::default(),
            Arc::new(RawEncoderFactory),
            Duration::from_millis(100),
        )
    }

    fn live_source() -> FrameSource {
        let size = FrameSize::new(4, 3);
        FrameSource::live(SourceId(1), size, Box::new(MockStream::standalone(size)))
    }

    #[tokio::test]
    async fn test_start_on_recorded_source_fails() {
        let recorder = handle();
        let size = FrameSize::new(2, 2);
        let clip = DecodedClip {
            size,
            frames: vec![Frame::filled(0, 0.0, size, [0; 4])],
            duration_seconds: 1.0,
        };
        let source = FrameSource::recorded(SourceId(2), clip).unwrap();

        let err = recorder.start(&source).await.unwrap_err();
        assert_eq!(err.downcast_ref::<CaptureError>(), Some(&CaptureError::NoActiveStream));
        assert_eq!(recorder.status(), RecorderStatus::default());
    }

    #[tokio::test]
    async fn test_record_and_stop_twice() {
        let recorder = handle();
        let mut source = live_source();

        recorder.start(&source).await.unwrap();
        assert_eq!(recorder.status().state, RecordingState::Recording);

        for _ in 0..5 {
            source.next_frame().await.unwrap();
        }

        let finished = recorder.stop().await.unwrap().unwrap();
        assert_eq!(finished.artifact.mime_type, RAW_MIME_TYPE);
        assert!(finished.url.starts_with("file://"));
        assert!(finished.path().to_string_lossy().ends_with(".swcr"));

        let on_disk = std::fs::read(finished.path()).unwrap();
        assert_eq!(on_disk, finished.artifact.data);
        assert_eq!(decode_raw(&on_disk).unwrap().frames.len(), 5);
        assert_eq!(recorder.status().state, RecordingState::Stopped);

        assert!(recorder.stop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_while_recording_is_rejected() {
        let recorder = handle();
        let source = live_source();

        recorder.start(&source).await.unwrap();
        let err = recorder.start(&source).await.unwrap_err();
        assert_eq!(err.downcast_ref::<CaptureError>(), Some(&CaptureError::RecordingActive));
    }

    #[tokio::test]
    async fn test_pause_resume_before_start_are_ignored() {
        let recorder = handle();
        recorder.pause().await.unwrap();
        recorder.resume().await.unwrap();
        assert!(recorder.stop().await.unwrap().is_none());
        assert_eq!(recorder.status().state, RecordingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_and_clock_follow_pause() {
        let recorder = handle();
        let mut source = live_source();
        recorder.start(&source).await.unwrap();

        // One frame per flush interval and a half, each lands in its own chunk
        for _ in 0..3 {
            source.next_frame().await.unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        tokio::time::sleep(Duration::from_millis(2050)).await;
        assert_eq!(
            recorder.status(),
            RecorderStatus {
                state: RecordingState::Recording,
                elapsed_seconds: 2,
            }
        );

        recorder.pause().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            recorder.status(),
            RecorderStatus {
                state: RecordingState::Paused,
                elapsed_seconds: 2,
            }
        );

        recorder.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            recorder.status(),
            RecorderStatus {
                state: RecordingState::Recording,
                elapsed_seconds: 3,
            }
        );

        let finished = recorder.stop().await.unwrap().unwrap();
        assert!(finished.chunks >= 4, "only {} chunks", finished.chunks);

        let clip = decode_raw(&finished.artifact.data).unwrap();
        let indices: Vec<u64> = clip.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_take_finalised_when_source_goes_away() {
        let recorder = handle();
        let mut source = live_source();
        recorder.start(&source).await.unwrap();

        for _ in 0..4 {
            source.next_frame().await.unwrap();
        }
        drop(source);

        let mut status_rx = recorder.subscribe_status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status_rx.wait_for(|s| s.state == RecordingState::Stopped),
        )
        .await
        .unwrap()
        .unwrap();

        let finished = recorder.stop().await.unwrap().unwrap();
        assert_eq!(decode_raw(&finished.artifact.data).unwrap().frames.len(), 4);
        assert!(recorder.stop().await.unwrap().is_none());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("video/webm;codecs=vp9"), ".webm");
        assert_eq!(file_extension(RAW_MIME_TYPE), ".swcr");
        assert_eq!(file_extension("application/octet-stream"), ".bin");
    }
}
