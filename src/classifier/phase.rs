use serde::{Deserialize, Serialize};
use std::fmt;

/// The five ordered phases of a golf swing
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SwingPhase {
    #[default]
    Setup,
    Backswing,
    Downswing,
    Impact,
    FollowThrough,
}

impl SwingPhase {
    pub const ALL: [SwingPhase; 5] = [
        SwingPhase::Setup,
        SwingPhase::Backswing,
        SwingPhase::Downswing,
        SwingPhase::Impact,
        SwingPhase::FollowThrough,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            SwingPhase::Setup => "Setup",
            SwingPhase::Backswing => "Backswing",
            SwingPhase::Downswing => "Downswing",
            SwingPhase::Impact => "Impact",
            SwingPhase::FollowThrough => "Follow-through",
        }
    }

    /// Coaching tips shown next to the phase indicator
    pub fn tips(self) -> &'static [&'static str] {
        match self {
            SwingPhase::Setup => &[
                "Feet shoulder-width apart",
                "Slight knee flex",
                "Spine angle tilted from hips",
            ],
            SwingPhase::Backswing => &[
                "Maintain spine angle",
                "Keep lead arm straight",
                "Rotate shoulders fully",
            ],
            SwingPhase::Downswing => &[
                "Start with lower body",
                "Maintain lag angle",
                "Keep head behind the ball",
            ],
            SwingPhase::Impact => &[
                "Eyes on the ball",
                "Weight on lead foot",
                "Hands ahead of clubhead",
            ],
            SwingPhase::FollowThrough => &[
                "Fully rotate hips and shoulders",
                "Complete weight transfer",
                "Balanced finish position",
            ],
        }
    }
}

impl fmt::Display for SwingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
