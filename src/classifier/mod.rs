pub mod machine;
pub mod phase;
pub mod rules;

pub use machine::{ClassifierConfig, PhaseClassifier, PhaseTransition, TransitionKind};
pub use phase::SwingPhase;
