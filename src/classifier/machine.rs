use super::phase::SwingPhase;
use super::rules::{self, LiveRuleConfig, RuleInput, SwingFeatures};
use crate::pose::{BodySide, PoseEstimate};
use crate::video::{PlaybackPosition, SourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Run the rules on every Nth frame that produced a pose
    pub sample_every: u32,
    pub min_confidence: f32,
    /// Evaluations spent in the current phase before skipping ahead is allowed
    pub min_skip_dwell: u32,
    /// Evaluations spent in the current phase before moving backwards is allowed
    pub min_regression_dwell: u32,
    /// Arm whose geometry drives live classification
    pub lead_side: BodySide,
    /// Playback progress at which Backswing, Downswing, Impact and
    /// FollowThrough begin
    pub recorded_thresholds: [f64; 4],
    pub live_rules: LiveRuleConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sample_every: 5,
            min_confidence: 0.3,
            min_skip_dwell: 10,
            min_regression_dwell: 25,
            lead_side: BodySide::Left,
            recorded_thresholds: [0.2, 0.4, 0.6, 0.8],
            live_rules: LiveRuleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionKind {
    /// One phase forward
    Advance,
    /// Several phases forward after a long dwell
    Skip,
    /// Backwards after a long dwell: a new swing attempt
    Regression,
    /// Recorded mode follows the playback position
    Playback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: SwingPhase,
    pub to: SwingPhase,
    pub kind: TransitionKind,
    /// Processed-frame count at which the transition was accepted
    pub frame: u64,
}

/// Turns a stream of pose estimates into a debounced swing phase
pub struct PhaseClassifier {
    config: ClassifierConfig,
    mode: SourceKind,
    current: SwingPhase,
    frame_counter: u64,
    dwell: u32,
    previous_features: Option<SwingFeatures>,
}

impl PhaseClassifier {
    pub fn new(config: ClassifierConfig, mode: SourceKind) -> Self {
        Self {
            config,
            mode,
            current: SwingPhase::Setup,
            frame_counter: 0,
            dwell: 0,
            previous_features: None,
        }
    }

    pub fn current_phase(&self) -> SwingPhase {
        self.current
    }

    #[cfg(test)]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Consecutive evaluations spent in the current phase
    #[cfg(test)]
    pub fn dwell(&self) -> u32 {
        self.dwell
    }

    /// Feed one frame's estimate; returns a transition only when the phase
    /// actually changes
    pub fn observe(
        &mut self,
        pose: Option<&PoseEstimate>,
        position: PlaybackPosition,
    ) -> Option<PhaseTransition> {
        let pose = pose?;

        self.frame_counter += 1;
        if self.frame_counter % self.config.sample_every.max(1) as u64 != 0 {
            return None;
        }

        match self.mode {
            SourceKind::Recorded => {
                let target = rules::phase_for_progress(
                    position.progress(),
                    &self.config.recorded_thresholds,
                );
                self.follow_playback(target)
            }
            SourceKind::Live => {
                let features = SwingFeatures::extract(
                    pose,
                    self.config.lead_side,
                    self.config.min_confidence,
                )?;
                let input = RuleInput::new(features, self.previous_features.as_ref());
                self.previous_features = Some(features);

                let candidate = rules::classify_live(&input, &self.config.live_rules);
                tracing::debug!(
                    "Live evaluation: extension={:.2} height={:.2} rise={:.2} candidate={:?}",
                    features.extension,
                    features.wrist_height,
                    input.rise,
                    candidate
                );
                self.apply_candidate(candidate)
            }
        }
    }

    fn follow_playback(&mut self, target: SwingPhase) -> Option<PhaseTransition> {
        if target == self.current {
            self.dwell = self.dwell.saturating_add(1);
            return None;
        }
        Some(self.transition(target, TransitionKind::Playback))
    }

    /// Progression policy for a live candidate
    pub fn apply_candidate(&mut self, candidate: Option<SwingPhase>) -> Option<PhaseTransition> {
        let Some(candidate) = candidate else {
            self.hold();
            return None;
        };

        let cur = self.current.index();
        let cand = candidate.index();

        let kind = if cand == cur + 1 {
            Some(TransitionKind::Advance)
        } else if cand > cur + 1 && self.dwell >= self.config.min_skip_dwell {
            Some(TransitionKind::Skip)
        } else if cand < cur && self.dwell >= self.config.min_regression_dwell {
            Some(TransitionKind::Regression)
        } else {
            None
        };

        match kind {
            Some(kind) => Some(self.transition(candidate, kind)),
            None => {
                self.hold();
                None
            }
        }
    }

    fn hold(&mut self) {
        self.dwell = self.dwell.saturating_add(1);
    }

    fn transition(&mut self, to: SwingPhase, kind: TransitionKind) -> PhaseTransition {
        let transition = PhaseTransition {
            from: self.current,
            to,
            kind,
            frame: self.frame_counter,
        };
        tracing::info!(
            "Swing phase {} -> {} ({:?}, dwell {})",
            transition.from,
            transition.to,
            kind,
            self.dwell
        );
        self.current = to;
        self.dwell = 0;
        transition
    }
}
