use super::encoder::{EncoderFactory, VideoEncoder};
use super::frame::FrameSize;
use crate::error::CaptureError;

/// One entry in the recording format preference list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingFormat {
    /// A specific container/codec, e.g. `video/webm;codecs=vp9`
    Mime(String),
    /// Whatever the encoder runtime picks on its own
    Default,
}

impl RecordingFormat {
    pub fn label(&self) -> &str {
        match self {
            RecordingFormat::Mime(mime) => mime,
            RecordingFormat::Default => "default",
        }
    }
}

/// Ordered recording formats, most preferred first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPreference {
    formats: Vec<RecordingFormat>,
}

impl FormatPreference {
    /// Build a preference list from mime types; the runtime default is always
    /// appended as the last resort
    pub fn new<I, S>(mimes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut formats: Vec<RecordingFormat> = mimes
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| !m.trim().is_empty())
            .map(RecordingFormat::Mime)
            .collect();
        formats.push(RecordingFormat::Default);
        Self { formats }
    }

    #[cfg(test)]
    pub fn formats(&self) -> &[RecordingFormat] {
        &self.formats
    }

    /// Try each format in order and keep the first encoder the runtime accepts
    pub fn negotiate(
        &self,
        factory: &dyn EncoderFactory,
        size: FrameSize,
    ) -> Result<Box<dyn VideoEncoder>, CaptureError> {
        for format in &self.formats {
            match factory.create(format, size) {
                Some(encoder) => {
                    tracing::info!(
                        "Recording format negotiated: {} (requested {})",
                        encoder.mime_type(),
                        format.label()
                    );
                    return Ok(encoder);
                }
                None => tracing::debug!("Recording format rejected: {}", format.label()),
            }
        }

        Err(CaptureError::UnsupportedRecording {
            tried: self.formats.iter().map(|f| f.label().to_string()).collect(),
        })
    }
}

impl Default for FormatPreference {
    fn default() -> Self {
        Self::new(["video/webm;codecs=vp9", "video/webm;codecs=vp8"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::encoder::{RAW_MIME_TYPE, RawEncoderFactory};

    struct RejectAll;

    impl EncoderFactory for RejectAll {
        fn create(
            &self,
            _format: &RecordingFormat,
            _size: FrameSize,
        ) -> Option<Box<dyn VideoEncoder>> {
            None
        }
    }

    #[test]
    fn test_default_is_tried_last() {
        let prefs = FormatPreference::new(["video/webm;codecs=vp9", " "]);
        assert_eq!(
            prefs.formats(),
            &[
                RecordingFormat::Mime("video/webm;codecs=vp9".to_string()),
                RecordingFormat::Default
            ]
        );
    }

    #[test]
    fn test_negotiate_falls_back_to_runtime_default() {
        let encoder = FormatPreference::default()
            .negotiate(&RawEncoderFactory, FrameSize::new(4, 4))
            .unwrap();
        assert_eq!(encoder.mime_type(), RAW_MIME_TYPE);
    }

    #[test]
    fn test_negotiate_prefers_first_accepted() {
        let prefs = FormatPreference::new([RAW_MIME_TYPE, "video/webm"]);
        let encoder = prefs.negotiate(&RawEncoderFactory, FrameSize::new(4, 4)).unwrap();
        assert_eq!(encoder.mime_type(), RAW_MIME_TYPE);
    }

    #[test]
    fn test_negotiate_unsupported() {
        let err = FormatPreference::default()
            .negotiate(&RejectAll, FrameSize::new(4, 4))
            .err()
            .unwrap();
        assert_eq!(
            err,
            CaptureError::UnsupportedRecording {
                tried: vec![
                    "video/webm;codecs=vp9".to_string(),
                    "video/webm;codecs=vp8".to_string(),
                    "default".to_string()
                ]
            }
        );
    }
}
