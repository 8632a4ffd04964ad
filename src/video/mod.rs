pub mod device;
pub mod encoder;
pub mod format;
pub mod frame;
pub mod session;
pub mod source;

pub use device::{CaptureConstraints, CaptureDevice, Facing, Orientation, TestPatternDevice};
pub use encoder::{EncoderFactory, RawEncoderFactory, VideoEncoder, decode_raw};
pub use format::FormatPreference;
pub use frame::{Frame, FrameSize, PlaybackPosition};
pub use session::{RecordingArtifact, RecordingSession, RecordingState};
pub use source::{FrameSource, LiveFeed, SourceId, SourceInfo, SourceKind};
