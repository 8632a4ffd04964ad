//! Phase rules: the live-mode decision table and the playback step function

use super::phase::SwingPhase;
use crate::pose::{BodyPart, BodySide, PoseEstimate};
use serde::{Deserialize, Serialize};

/// Tunable thresholds of the live decision table
///
/// Heights are measured in torso lengths above the shoulder line (negative
/// means below), rise is the change of that height between two evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveRuleConfig {
    /// Hands lower than this are at address or impact height
    pub address_max_height: f32,
    pub setup_min_extension: f32,
    /// Minimum |rise| that counts as the hands moving
    pub motion_epsilon: f32,
    pub impact_min_extension: f32,
    /// Hands higher than this are at the top or the finish
    pub finish_min_height: f32,
}

impl Default for LiveRuleConfig {
    fn default() -> Self {
        Self {
            address_max_height: -0.55,
            setup_min_extension: 0.8,
            motion_epsilon: 0.08,
            impact_min_extension: 0.85,
            finish_min_height: 0.2,
        }
    }
}

/// Geometry of the lead arm in one pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingFeatures {
    /// Elbow→wrist distance over shoulder→elbow distance
    pub extension: f32,
    /// Wrist height above the shoulder line, in torso lengths
    pub wrist_height: f32,
}

impl SwingFeatures {
    /// Extract features, or `None` if any required keypoint is missing or
    /// below `min_confidence`
    pub fn extract(pose: &PoseEstimate, side: BodySide, min_confidence: f32) -> Option<Self> {
        let left_shoulder = pose.confident(BodyPart::LeftShoulder, min_confidence)?;
        let right_shoulder = pose.confident(BodyPart::RightShoulder, min_confidence)?;
        let shoulder = pose.confident(side.shoulder(), min_confidence)?;
        let elbow = pose.confident(side.elbow(), min_confidence)?;
        let wrist = pose.confident(side.wrist(), min_confidence)?;
        let hip = pose.confident(side.hip(), min_confidence)?;

        let shoulder_line = (left_shoulder.y + right_shoulder.y) / 2.0;

        // One pixel floor keeps collapsed limbs from dividing by zero
        let upper_arm = shoulder.distance(elbow).max(1.0);
        let torso = shoulder.distance(hip).max(1.0);

        Some(Self {
            extension: elbow.distance(wrist) / upper_arm,
            wrist_height: (shoulder_line - wrist.y) / torso,
        })
    }
}

/// Input to one row of the decision table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleInput {
    pub features: SwingFeatures,
    /// Change of wrist height since the previous evaluation (0 on the first)
    pub rise: f32,
}

impl RuleInput {
    pub fn new(features: SwingFeatures, previous: Option<&SwingFeatures>) -> Self {
        let rise = previous
            .map(|p| features.wrist_height - p.wrist_height)
            .unwrap_or(0.0);
        Self { features, rise }
    }
}

pub struct PhaseRule {
    pub phase: SwingPhase,
    pub matches: fn(&RuleInput, &LiveRuleConfig) -> bool,
}

/// Rows in enumeration order; the first match is the candidate phase
pub const DECISION_TABLE: [PhaseRule; 5] = [
    PhaseRule {
        phase: SwingPhase::Setup,
        matches: is_address,
    },
    PhaseRule {
        phase: SwingPhase::Backswing,
        matches: is_rising,
    },
    PhaseRule {
        phase: SwingPhase::Downswing,
        matches: is_falling,
    },
    PhaseRule {
        phase: SwingPhase::Impact,
        matches: is_striking,
    },
    PhaseRule {
        phase: SwingPhase::FollowThrough,
        matches: is_finished,
    },
];

fn is_address(input: &RuleInput, config: &LiveRuleConfig) -> bool {
    input.features.wrist_height < config.address_max_height
        && input.features.extension >= config.setup_min_extension
        && input.rise.abs() < config.motion_epsilon
}

fn is_rising(input: &RuleInput, config: &LiveRuleConfig) -> bool {
    input.rise >= config.motion_epsilon && input.features.wrist_height < config.finish_min_height
}

fn is_falling(input: &RuleInput, config: &LiveRuleConfig) -> bool {
    input.rise <= -config.motion_epsilon && input.features.wrist_height >= config.address_max_height
}

fn is_striking(input: &RuleInput, config: &LiveRuleConfig) -> bool {
    input.features.wrist_height < config.address_max_height
        && input.features.extension >= config.impact_min_extension
        && input.rise.abs() >= config.motion_epsilon
}

fn is_finished(input: &RuleInput, config: &LiveRuleConfig) -> bool {
    input.features.wrist_height >= config.finish_min_height
}

/// Candidate phase for a live pose, `None` when no row matches
pub fn classify_live(input: &RuleInput, config: &LiveRuleConfig) -> Option<SwingPhase> {
    DECISION_TABLE
        .iter()
        .find(|rule| (rule.matches)(input, config))
        .map(|rule| rule.phase)
}

/// Phase for a normalised playback position
///
/// `thresholds[i]` is where phase `i + 1` begins.
pub fn phase_for_progress(progress: f64, thresholds: &[f64; 4]) -> SwingPhase {
    let index = thresholds.iter().take_while(|t| progress >= **t).count();
    SwingPhase::from_index(index).unwrap_or(SwingPhase::FollowThrough)
}
