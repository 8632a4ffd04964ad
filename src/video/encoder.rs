use super::format::RecordingFormat;
use super::frame::{Frame, FrameSize};
use crate::error::CaptureError;
use anyhow::Result;

/// Mime type of the built-in uncompressed clip format
pub const RAW_MIME_TYPE: &str = "video/x-swingcam-raw";

const MAGIC: &[u8; 4] = b"SWCR";
const VERSION: u8 = 1;
const FRAME_TAG: u8 = b'F';
const END_TAG: u8 = b'E';
const HEADER_LEN: usize = 4 + 1 + 4 + 4;

/// Trait for streaming video encoding
///
/// Frames are written as they arrive; `flush` hands back whatever has been
/// encoded since the previous flush so the recorder can buffer it as a chunk.
/// Concatenating every flushed chunk followed by the bytes from `finish`
/// yields one complete artifact.
pub trait VideoEncoder: Send {
    /// Negotiated mime type of the produced stream
    fn mime_type(&self) -> &str;

    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Take the bytes encoded since the last flush (may be empty)
    fn flush(&mut self) -> Vec<u8>;

    /// Close the stream, returning any trailing bytes
    fn finish(&mut self) -> Result<Vec<u8>>;
}

/// The encoding runtime: decides which formats it accepts
pub trait EncoderFactory: Send + Sync {
    /// Returns `None` when the runtime does not support the requested format
    fn create(&self, format: &RecordingFormat, size: FrameSize) -> Option<Box<dyn VideoEncoder>>;
}

/// Runtime that only knows the built-in raw format
pub struct RawEncoderFactory;

impl EncoderFactory for RawEncoderFactory {
    fn create(&self, format: &RecordingFormat, size: FrameSize) -> Option<Box<dyn VideoEncoder>> {
        match format {
            RecordingFormat::Default => Some(Box::new(RawEncoder::new(size))),
            RecordingFormat::Mime(mime) if mime == RAW_MIME_TYPE => {
                Some(Box::new(RawEncoder::new(size)))
            }
            RecordingFormat::Mime(_) => None,
        }
    }
}

/// Uncompressed RGBA clip writer
///
/// Timestamps are rebased so the first written frame starts the clip at zero.
pub struct RawEncoder {
    size: FrameSize,
    pending: Vec<u8>,
    frames_written: u64,
    first_timestamp: Option<f64>,
    last_timestamp: f64,
    finished: bool,
}

impl RawEncoder {
    pub fn new(size: FrameSize) -> Self {
        let mut pending = Vec::with_capacity(HEADER_LEN);
        pending.extend_from_slice(MAGIC);
        pending.push(VERSION);
        pending.extend_from_slice(&size.width.to_le_bytes());
        pending.extend_from_slice(&size.height.to_le_bytes());

        Self {
            size,
            pending,
            frames_written: 0,
            first_timestamp: None,
            last_timestamp: 0.0,
            finished: false,
        }
    }
}

impl VideoEncoder for RawEncoder {
    fn mime_type(&self) -> &str {
        RAW_MIME_TYPE
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            anyhow::bail!("Encoder already finished");
        }
        if frame.size != self.size {
            anyhow::bail!(
                "Frame size {}x{} does not match stream size {}x{}",
                frame.size.width,
                frame.size.height,
                self.size.width,
                self.size.height
            );
        }

        let origin = *self.first_timestamp.get_or_insert(frame.timestamp);
        let timestamp = (frame.timestamp - origin).max(self.last_timestamp);

        self.pending.push(FRAME_TAG);
        self.pending.extend_from_slice(&self.frames_written.to_le_bytes());
        self.pending.extend_from_slice(&timestamp.to_le_bytes());
        self.pending.extend_from_slice(&frame.pixels);

        self.frames_written += 1;
        self.last_timestamp = timestamp;
        Ok(())
    }

    fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        if self.finished {
            anyhow::bail!("Encoder already finished");
        }
        self.finished = true;

        // Last frame is shown for one average frame interval
        let frame_interval = if self.frames_written > 1 {
            self.last_timestamp / (self.frames_written - 1) as f64
        } else {
            0.0
        };
        let duration = self.last_timestamp + frame_interval;

        let mut tail = std::mem::take(&mut self.pending);
        tail.push(END_TAG);
        tail.extend_from_slice(&self.frames_written.to_le_bytes());
        tail.extend_from_slice(&duration.to_le_bytes());
        Ok(tail)
    }
}

/// A fully decoded clip
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub size: FrameSize,
    pub frames: Vec<Frame>,
    pub duration_seconds: f64,
}

/// Decode a complete raw clip produced by [`RawEncoder`]
pub fn decode_raw(data: &[u8]) -> Result<DecodedClip, CaptureError> {
    let mut reader = ByteReader::new(data);

    if reader.take(4)? != MAGIC {
        return Err(CaptureError::InvalidClip("bad magic".into()));
    }
    let version = reader.u8()?;
    if version != VERSION {
        return Err(CaptureError::InvalidClip(format!("unsupported version {}", version)));
    }
    let size = FrameSize::new(reader.u32()?, reader.u32()?);
    if size.width == 0 || size.height == 0 {
        return Err(CaptureError::InvalidClip("empty frame size".into()));
    }
    let frame_len = size
        .checked_buffer_len()
        .ok_or_else(|| CaptureError::InvalidClip("frame size too large".into()))?;

    let mut frames = Vec::new();
    let mut duration_seconds = None;

    while !reader.is_empty() {
        match reader.u8()? {
            FRAME_TAG => {
                let index = reader.u64()?;
                let timestamp = reader.f64()?;
                let pixels = reader.take(frame_len)?.to_vec();
                frames.push(Frame::new(index, timestamp, size, pixels));
            }
            END_TAG => {
                let count = reader.u64()?;
                if count != frames.len() as u64 {
                    return Err(CaptureError::InvalidClip(format!(
                        "trailer declares {} frames, found {}",
                        count,
                        frames.len()
                    )));
                }
                duration_seconds = Some(reader.f64()?);
                break;
            }
            tag => {
                return Err(CaptureError::InvalidClip(format!("unknown record tag {:#04x}", tag)));
            }
        }
    }

    if frames.is_empty() {
        return Err(CaptureError::InvalidClip("clip contains no frames".into()));
    }

    // Clips cut off before the trailer end at their last frame
    let duration_seconds =
        duration_seconds.unwrap_or_else(|| frames.last().map(|f| f.timestamp).unwrap_or(0.0));

    Ok(DecodedClip {
        size,
        frames,
        duration_seconds,
    })
}

struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CaptureError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CaptureError::InvalidClip("unexpected end of data".into()))?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CaptureError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CaptureError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CaptureError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CaptureError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, CaptureError> {
        Ok(f64::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, timestamp: f64, shade: u8) -> Frame {
        Frame::filled(index, timestamp, FrameSize::new(2, 2), [shade, shade, shade, 255])
    }

    #[test]
    fn test_chunks_concatenate_into_clip() {
        let mut encoder = RawEncoder::new(FrameSize::new(2, 2));
        let mut data = Vec::new();

        encoder.write_frame(&frame(40, 10.0, 1)).unwrap();
        data.extend(encoder.flush());
        assert!(encoder.flush().is_empty());

        encoder.write_frame(&frame(41, 10.5, 2)).unwrap();
        encoder.write_frame(&frame(42, 11.0, 3)).unwrap();
        data.extend(encoder.flush());
        data.extend(encoder.finish().unwrap());

        let clip = decode_raw(&data).unwrap();
        assert_eq!(clip.frames.len(), 3);
        assert_eq!(clip.frames[0].index, 0);
        assert_eq!(clip.frames[0].timestamp, 0.0);
        assert_eq!(clip.frames[2].timestamp, 1.0);
        assert_eq!(clip.frames[2].pixel(1, 1), Some([3, 3, 3, 255]));
        assert_eq!(clip.duration_seconds, 1.5);
    }

    #[test]
    fn test_rejects_mismatched_frame_size() {
        let mut encoder = RawEncoder::new(FrameSize::new(4, 4));
        assert!(encoder.write_frame(&frame(0, 0.0, 0)).is_err());
    }

    #[test]
    fn test_decode_without_trailer() {
        let mut encoder = RawEncoder::new(FrameSize::new(2, 2));
        encoder.write_frame(&frame(0, 0.0, 1)).unwrap();
        encoder.write_frame(&frame(1, 0.25, 1)).unwrap();

        let clip = decode_raw(&encoder.flush()).unwrap();
        assert_eq!(clip.frames.len(), 2);
        assert_eq!(clip.duration_seconds, 0.25);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_raw(b"nope"), Err(CaptureError::InvalidClip(_))));

        let header_only = RawEncoder::new(FrameSize::new(2, 2)).flush();
        assert!(matches!(decode_raw(&header_only), Err(CaptureError::InvalidClip(_))));

        let mut truncated = RawEncoder::new(FrameSize::new(2, 2));
        truncated.write_frame(&frame(0, 0.0, 1)).unwrap();
        let mut data = truncated.flush();
        data.truncate(data.len() - 3);
        assert!(matches!(decode_raw(&data), Err(CaptureError::InvalidClip(_))));
    }

    #[test]
    fn test_decode_rejects_impossible_frame_size() {
        let header = |width: u32, height: u32| {
            let mut data = MAGIC.to_vec();
            data.push(VERSION);
            data.extend_from_slice(&width.to_le_bytes());
            data.extend_from_slice(&height.to_le_bytes());
            data.push(FRAME_TAG);
            data
        };

        assert_eq!(
            decode_raw(&header(u32::MAX, u32::MAX)).unwrap_err(),
            CaptureError::InvalidClip("frame size too large".into())
        );
        assert_eq!(
            decode_raw(&header(0, 720)).unwrap_err(),
            CaptureError::InvalidClip("empty frame size".into())
        );
        // Fits in memory but the data is far too short
        assert!(matches!(
            decode_raw(&header(70_000, 70_000)),
            Err(CaptureError::InvalidClip(_))
        ));
    }

    #[test]
    fn test_factory_accepts_only_raw() {
        let size = FrameSize::new(2, 2);
        assert!(RawEncoderFactory.create(&RecordingFormat::Default, size).is_some());
        assert!(
            RawEncoderFactory
                .create(&RecordingFormat::Mime(RAW_MIME_TYPE.into()), size)
                .is_some()
        );
        assert!(
            RawEncoderFactory
                .create(&RecordingFormat::Mime("video/webm".into()), size)
                .is_none()
        );
    }
}
