use super::frame::{Frame, FrameSize};
use crate::error::CaptureError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear camera, pointed at the golfer
    Environment,
    /// Front camera
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// What the caller asks of the camera; devices treat the size as a hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: Facing,
    pub orientation: Orientation,
    pub ideal_size: FrameSize,
}

impl CaptureConstraints {
    /// Ideal size with the orientation applied
    pub fn oriented_size(&self) -> FrameSize {
        let landscape = if self.ideal_size.width >= self.ideal_size.height {
            self.ideal_size
        } else {
            self.ideal_size.transposed()
        };
        match self.orientation {
            Orientation::Landscape => landscape,
            Orientation::Portrait => landscape.transposed(),
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            orientation: Orientation::Landscape,
            ideal_size: FrameSize::new(1280, 720),
        }
    }
}

/// A camera (or anything that behaves like one)
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire a new live stream; fails with `DeviceAccess` on permission or
    /// hardware problems
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// An open live capture handle
#[async_trait]
pub trait CaptureStream: Send {
    /// Wait until the first decodable frame is available
    async fn ready(&mut self) -> Result<FrameSize, CaptureError>;

    /// Next captured frame; `None` once the stream has been stopped
    async fn next_frame(&mut self) -> Option<Frame>;

    /// Stop every track and release the device; safe to call more than once
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Synthetic camera producing a moving test pattern
pub struct TestPatternDevice {
    fps: u32,
    max_size: FrameSize,
}

impl TestPatternDevice {
    pub fn new(fps: u32, max_size: FrameSize) -> Self {
        Self {
            fps: fps.max(1),
            max_size,
        }
    }
}

#[async_trait]
impl CaptureDevice for TestPatternDevice {
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let wanted = constraints.oriented_size();
        // Like real sensors, never exceed the native resolution
        let scale = f64::min(
            1.0,
            f64::min(
                self.max_size.width as f64 / wanted.width.max(1) as f64,
                self.max_size.height as f64 / wanted.height.max(1) as f64,
            ),
        );
        let size = FrameSize::new(
            ((wanted.width as f64 * scale) as u32).max(1),
            ((wanted.height as f64 * scale) as u32).max(1),
        );

        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / self.fps as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            "Test pattern opened at {}x{} ({:?})",
            size.width,
            size.height,
            constraints.facing
        );

        Ok(Box::new(TestPatternStream {
            size,
            facing: constraints.facing,
            ticker,
            started: Instant::now(),
            next_index: 0,
            active: true,
        }))
    }
}

struct TestPatternStream {
    size: FrameSize,
    facing: Facing,
    ticker: Interval,
    started: Instant,
    next_index: u64,
    active: bool,
}

impl TestPatternStream {
    fn render(&self, index: u64, timestamp: f64) -> Frame {
        let background = match self.facing {
            Facing::Environment => [24, 60, 32, 255],
            Facing::User => [32, 32, 60, 255],
        };
        let mut frame = Frame::filled(index, timestamp, self.size, background);

        // A vertical bar sweeping across the frame
        let bar_width = (self.size.width / 16).max(1) as u64;
        let bar_x = (index * 4) % self.size.width.max(1) as u64;
        for y in 0..self.size.height as i64 {
            for x in bar_x..(bar_x + bar_width) {
                frame.put_pixel(x as i64, y, [220, 220, 220, 255]);
            }
        }
        frame
    }
}

#[async_trait]
impl CaptureStream for TestPatternStream {
    async fn ready(&mut self) -> Result<FrameSize, CaptureError> {
        if !self.active {
            return Err(CaptureError::DeviceAccess("stream already stopped".into()));
        }
        Ok(self.size)
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        if !self.active {
            return None;
        }
        self.ticker.tick().await;
        let index = self.next_index;
        self.next_index += 1;
        Some(self.render(index, self.started.elapsed().as_secs_f64()))
    }

    fn stop(&mut self) {
        if self.active {
            tracing::debug!("Test pattern stopped after {} frames", self.next_index);
        }
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
