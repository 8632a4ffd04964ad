use serde::{Deserialize, Serialize};

/// Width and height of a frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of an RGBA buffer for this frame size
    pub fn buffer_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(Self::BYTES_PER_PIXEL)
    }

    /// Like [`buffer_len`](Self::buffer_len), but `None` when the size does
    /// not fit in memory
    pub fn checked_buffer_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(Self::BYTES_PER_PIXEL)
    }

    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// A decoded RGBA video frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position of the frame in its source, starting at 0
    pub index: u64,
    /// Presentation time in seconds from the start of the source
    pub timestamp: f64,
    pub size: FrameSize,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(index: u64, timestamp: f64, size: FrameSize, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), size.buffer_len());
        Self {
            index,
            timestamp,
            size,
            pixels,
        }
    }

    /// A frame filled with a single colour
    pub fn filled(index: u64, timestamp: f64, size: FrameSize, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(size.buffer_len())
            .collect();
        Self::new(index, timestamp, size, pixels)
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let offset = self.offset(x, y);
        let px = &self.pixels[offset..offset + FrameSize::BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn put_pixel(&mut self, x: i64, y: i64, rgba: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.size.width as i64 || y >= self.size.height as i64 {
            return;
        }
        let offset = self.offset(x as u32, y as u32);
        self.pixels[offset..offset + FrameSize::BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.size.width as usize + x as usize) * FrameSize::BYTES_PER_PIXEL
    }
}

/// Playback clock of a frame source at the moment a frame was produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    pub current_seconds: f64,
    /// Only known for recorded sources
    pub duration_seconds: Option<f64>,
}

impl PlaybackPosition {
    pub fn live(current_seconds: f64) -> Self {
        Self {
            current_seconds,
            duration_seconds: None,
        }
    }

    pub fn recorded(current_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            current_seconds,
            duration_seconds: Some(duration_seconds),
        }
    }

    /// Normalised position in `[0, 1]`
    ///
    /// A missing, zero or non-finite duration is replaced by one second.
    pub fn progress(&self) -> f64 {
        let denominator = match self.duration_seconds {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => 1.0,
        };
        let progress = self.current_seconds / denominator;
        if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress() {
        assert_eq!(PlaybackPosition::recorded(7.0, 10.0).progress(), 0.7);
        assert_eq!(PlaybackPosition::recorded(12.0, 10.0).progress(), 1.0);
        assert_eq!(PlaybackPosition::recorded(0.5, 0.0).progress(), 0.5);
        assert_eq!(PlaybackPosition::recorded(0.5, f64::NAN).progress(), 0.5);
    }

    #[test]
    fn test_put_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::filled(0, 0.0, FrameSize::new(2, 2), [0, 0, 0, 255]);
        frame.put_pixel(-1, 0, [255, 0, 0, 255]);
        frame.put_pixel(2, 1, [255, 0, 0, 255]);
        frame.put_pixel(1, 1, [255, 0, 0, 255]);

        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(frame.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(frame.pixel(2, 2), None);
    }
}
