use super::encoder::{EncoderFactory, VideoEncoder};
use super::format::FormatPreference;
use super::frame::{Frame, FrameSize};
use super::source::SourceKind;
use crate::error::CaptureError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

/// A finalised take: every buffered chunk concatenated in order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// One take, from "start recording" to "stop"
///
/// Holds the negotiated encoder while the take is active and buffers the
/// encoded bytes as ordered chunks. Starting again after a stop replaces the
/// whole take.
pub struct RecordingSession {
    state: RecordingState,
    elapsed_seconds: u64,
    chunks: Vec<Vec<u8>>,
    mime_type: Option<String>,
    encoder: Option<Box<dyn VideoEncoder>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            elapsed_seconds: 0,
            chunks: Vec::new(),
            mime_type: None,
            encoder: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Recording or paused
    pub fn is_active(&self) -> bool {
        matches!(self.state, RecordingState::Recording | RecordingState::Paused)
    }

    /// Begin a new take from a live source
    ///
    /// Nothing is mutated when the source is not live or no format is accepted.
    pub fn start(
        &mut self,
        kind: SourceKind,
        size: FrameSize,
        factory: &dyn EncoderFactory,
        formats: &FormatPreference,
    ) -> Result<(), CaptureError> {
        if kind != SourceKind::Live {
            return Err(CaptureError::NoActiveStream);
        }
        if self.is_active() {
            return Err(CaptureError::RecordingActive);
        }

        let encoder = formats.negotiate(factory, size)?;

        self.mime_type = Some(encoder.mime_type().to_string());
        self.encoder = Some(encoder);
        self.chunks.clear();
        self.elapsed_seconds = 0;
        self.state = RecordingState::Recording;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state != RecordingState::Recording {
            return;
        }
        self.flush();
        self.state = RecordingState::Paused;
    }

    pub fn resume(&mut self) {
        if self.state != RecordingState::Paused {
            return;
        }
        self.state = RecordingState::Recording;
    }

    /// Encode a captured frame; frames arriving while paused are dropped
    pub fn write_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        if self.state != RecordingState::Recording {
            return Ok(());
        }
        match self.encoder.as_mut() {
            Some(encoder) => encoder.write_frame(frame),
            None => Ok(()),
        }
    }

    /// Move the encoder's pending output into a new chunk
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            let chunk = encoder.flush();
            if !chunk.is_empty() {
                self.chunks.push(chunk);
            }
        }
    }

    /// One second of recording has passed
    pub fn tick_second(&mut self) {
        if self.state == RecordingState::Recording {
            self.elapsed_seconds += 1;
        }
    }

    /// Finalise the take
    ///
    /// Returns `None` when there is nothing to finalise: never started, or
    /// already stopped.
    pub fn stop(&mut self) -> anyhow::Result<Option<RecordingArtifact>> {
        if !self.is_active() {
            return Ok(None);
        }

        self.flush();
        let tail = match self.encoder.take() {
            Some(mut encoder) => encoder.finish(),
            None => Ok(Vec::new()),
        };
        // The encoder is gone either way, so the take cannot be finalised twice
        self.state = RecordingState::Stopped;

        let tail = tail?;
        if !tail.is_empty() {
            self.chunks.push(tail);
        }

        let data = self.chunks.concat();
        let mime_type = self.mime_type.clone().unwrap_or_default();
        Ok(Some(RecordingArtifact { data, mime_type }))
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Format elapsed seconds as `mm:ss`
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::encoder::{RAW_MIME_TYPE, RawEncoderFactory, decode_raw};
    use crate::video::format::RecordingFormat;

    /// Encoder whose stream cannot be closed
    struct BrokenFinish;

    impl VideoEncoder for BrokenFinish {
        fn mime_type(&self) -> &str {
            "video/broken"
        }

        fn write_frame(&mut self, _frame: &Frame) -> anyhow::Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> Vec<u8> {
            vec![1, 2, 3]
        }

        fn finish(&mut self) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("muxer closed")
        }
    }

    struct BrokenFinishFactory;

    impl EncoderFactory for BrokenFinishFactory {
        fn create(
            &self,
            _format: &RecordingFormat,
            _size: FrameSize,
        ) -> Option<Box<dyn VideoEncoder>> {
            Some(Box::new(BrokenFinish))
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::filled(index, index as f64 * 0.1, FrameSize::new(2, 2), [9, 9, 9, 255])
    }

    fn started() -> RecordingSession {
        let mut session = RecordingSession::new();
        session
            .start(
                SourceKind::Live,
                FrameSize::new(2, 2),
                &RawEncoderFactory,
                &FormatPreference::default(),
            )
            .unwrap();
        session
    }

    #[test]
    fn test_start_requires_live_source() {
        let mut session = RecordingSession::new();
        let result = session.start(
            SourceKind::Recorded,
            FrameSize::new(2, 2),
            &RawEncoderFactory,
            &FormatPreference::default(),
        );

        assert_eq!(result, Err(CaptureError::NoActiveStream));
        assert_eq!(session.state(), RecordingState::Idle);
        assert!(session.mime_type().is_none());
    }

    #[test]
    fn test_start_while_active_is_rejected() {
        let mut session = started();
        let result = session.start(
            SourceKind::Live,
            FrameSize::new(2, 2),
            &RawEncoderFactory,
            &FormatPreference::default(),
        );
        assert_eq!(result, Err(CaptureError::RecordingActive));
        assert_eq!(session.state(), RecordingState::Recording);
    }

    #[test]
    fn test_pause_and_resume_are_guarded() {
        let mut session = RecordingSession::new();
        session.pause();
        session.resume();
        assert_eq!(session.state(), RecordingState::Idle);

        let mut session = started();
        session.resume();
        assert_eq!(session.state(), RecordingState::Recording);

        session.tick_second();
        session.pause();
        session.tick_second();
        assert_eq!(session.state(), RecordingState::Paused);
        assert_eq!(session.elapsed_seconds(), 1);

        session.resume();
        session.tick_second();
        assert_eq!(session.elapsed_seconds(), 2);
    }

    #[test]
    fn test_frames_while_paused_are_dropped() {
        let mut session = started();
        session.write_frame(&frame(0)).unwrap();
        session.pause();
        session.write_frame(&frame(1)).unwrap();
        session.resume();
        session.write_frame(&frame(2)).unwrap();

        let artifact = session.stop().unwrap().unwrap();
        let clip = decode_raw(&artifact.data).unwrap();
        assert_eq!(clip.frames.len(), 2);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut session = started();
        session.write_frame(&frame(0)).unwrap();
        session.flush();
        session.write_frame(&frame(1)).unwrap();

        let artifact = session.stop().unwrap().unwrap();
        assert_eq!(artifact.mime_type, RAW_MIME_TYPE);
        assert_eq!(session.state(), RecordingState::Stopped);
        assert_eq!(artifact.data, session.chunks().concat());

        assert!(session.stop().unwrap().is_none());
        assert_eq!(session.state(), RecordingState::Stopped);
    }

    #[test]
    fn test_failed_finish_still_ends_the_take() {
        let mut session = RecordingSession::new();
        session
            .start(
                SourceKind::Live,
                FrameSize::new(2, 2),
                &BrokenFinishFactory,
                &FormatPreference::default(),
            )
            .unwrap();

        assert!(session.stop().is_err());
        assert_eq!(session.state(), RecordingState::Stopped);
        assert!(!session.is_active());
        assert!(session.stop().unwrap().is_none());
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let mut session = RecordingSession::new();
        assert!(session.stop().unwrap().is_none());
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn test_restart_replaces_take() {
        let mut session = started();
        session.write_frame(&frame(0)).unwrap();
        session.tick_second();
        session.stop().unwrap();

        session
            .start(
                SourceKind::Live,
                FrameSize::new(2, 2),
                &RawEncoderFactory,
                &FormatPreference::default(),
            )
            .unwrap();
        assert!(session.chunks().is_empty());
        assert_eq!(session.elapsed_seconds(), 0);
        assert_eq!(session.state(), RecordingState::Recording);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(75), "01:15");
        assert_eq!(format_elapsed(3600), "60:00");
    }
}
