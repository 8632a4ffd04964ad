use crate::error::CaptureError;
use crate::video::Frame;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Body parts reported by single-person pose models (COCO order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySide {
    Left,
    Right,
}

impl BodySide {
    pub fn shoulder(self) -> BodyPart {
        match self {
            BodySide::Left => BodyPart::LeftShoulder,
            BodySide::Right => BodyPart::RightShoulder,
        }
    }

    pub fn elbow(self) -> BodyPart {
        match self {
            BodySide::Left => BodyPart::LeftElbow,
            BodySide::Right => BodyPart::RightElbow,
        }
    }

    pub fn wrist(self) -> BodyPart {
        match self {
            BodySide::Left => BodyPart::LeftWrist,
            BodySide::Right => BodyPart::RightWrist,
        }
    }

    pub fn hip(self) -> BodyPart {
        match self {
            BodySide::Left => BodyPart::LeftHip,
            BodySide::Right => BodyPart::RightHip,
        }
    }
}

/// One estimated landmark in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: BodyPart,
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(name: BodyPart, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            name,
            x,
            y,
            confidence,
        }
    }

    pub fn distance(&self, other: &Keypoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// All keypoints of one detected person in one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseEstimate {
    pub keypoints: Vec<Keypoint>,
}

impl PoseEstimate {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == part)
    }

    /// The keypoint if it is present with at least `min_confidence`
    pub fn confident(&self, part: BodyPart, min_confidence: f32) -> Option<&Keypoint> {
        self.get(part).filter(|kp| kp.confidence >= min_confidence)
    }
}

/// External pose model: one call per frame
///
/// An empty result means no body was detected.
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    async fn estimate(&self, frame: &Frame) -> Result<Vec<PoseEstimate>, CaptureError>;
}

/// Replays pre-computed keypoints, one entry per frame index
///
/// Indices past the end wrap around so a short track can drive a live stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointTrack {
    pub frames: Vec<PoseEstimate>,
}

impl KeypointTrack {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keypoint track: {:?}", path))?;
        let track: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse keypoint track: {:?}", path))?;

        if track.frames.is_empty() {
            anyhow::bail!("Keypoint track {:?} has no frames", path);
        }

        tracing::info!("Loaded keypoint track with {} frames", track.frames.len());
        Ok(track)
    }

    #[cfg(test)]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl PoseEstimator for KeypointTrack {
    async fn estimate(&self, frame: &Frame) -> Result<Vec<PoseEstimate>, CaptureError> {
        if self.frames.is_empty() {
            return Err(CaptureError::Estimation("empty keypoint track".into()));
        }
        let pose = &self.frames[(frame.index % self.frames.len() as u64) as usize];
        if pose.keypoints.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![pose.clone()])
    }
}
