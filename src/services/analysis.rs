use crate::classifier::{ClassifierConfig, PhaseClassifier, PhaseTransition, SwingPhase};
use crate::overlay::OverlayRenderer;
use crate::pose::{PoseEstimate, PoseEstimator};
use crate::video::{Frame, PlaybackPosition, SourceId, SourceInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues cancellation tokens; cancelling invalidates every token issued so far
#[derive(Debug, Clone, Default)]
pub struct CancelSource {
    generation: Arc<AtomicU64>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            generation: self.generation.clone(),
            issued: self.generation.load(Ordering::SeqCst),
        }
    }

    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    generation: Arc<AtomicU64>,
    issued: u64,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.issued
    }
}

/// Result of processing one frame
#[derive(Debug)]
pub struct FrameOutcome {
    pub transition: Option<PhaseTransition>,
    pub overlay: Frame,
}

/// Estimate → classify → overlay for one source
///
/// A session never outlives its source: switching sources or stopping the
/// loop cancels its token and any in-flight estimate is discarded.
pub struct AnalysisSession {
    source_id: SourceId,
    classifier: PhaseClassifier,
    renderer: OverlayRenderer,
    last_pose: Option<PoseEstimate>,
    token: CancelToken,
}

impl AnalysisSession {
    pub fn new(config: ClassifierConfig, source: &SourceInfo, token: CancelToken) -> Self {
        let renderer = OverlayRenderer::new(config.min_confidence);
        Self {
            source_id: source.id,
            classifier: PhaseClassifier::new(config, source.kind),
            renderer,
            last_pose: None,
            token,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn phase(&self) -> SwingPhase {
        self.classifier.current_phase()
    }

    #[cfg(test)]
    pub fn classifier(&self) -> &PhaseClassifier {
        &self.classifier
    }

    #[cfg(test)]
    pub fn last_pose(&self) -> Option<&PoseEstimate> {
        self.last_pose.as_ref()
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run one frame through the loop
    ///
    /// Returns `None` when the session was cancelled, including while the
    /// estimate was in flight. Estimation errors are logged and treated as
    /// "no pose" so the loop keeps running.
    pub async fn process(
        &mut self,
        frame: &Frame,
        position: PlaybackPosition,
        estimator: &dyn PoseEstimator,
    ) -> Option<FrameOutcome> {
        if self.token.is_cancelled() {
            return None;
        }

        let estimate = match estimator.estimate(frame).await {
            Ok(poses) => {
                let pose = poses.into_iter().next();
                // Nobody in frame: stop drawing the old skeleton
                if pose.is_none() {
                    self.last_pose = None;
                }
                pose
            }
            Err(e) => {
                tracing::warn!("Pose estimation failed on frame {}: {}", frame.index, e);
                None
            }
        };

        if self.token.is_cancelled() {
            tracing::debug!("Discarding estimate for frame {} after cancellation", frame.index);
            return None;
        }

        let transition = self.classifier.observe(estimate.as_ref(), position);
        if estimate.is_some() {
            self.last_pose = estimate;
        }

        let overlay = self
            .renderer
            .render(frame, self.last_pose.as_ref(), self.classifier.current_phase());
        Some(FrameOutcome { transition, overlay })
    }
}
