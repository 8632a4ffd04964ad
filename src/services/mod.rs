pub mod analysis;
pub mod capture;
pub mod pipeline;
pub mod recorder;

pub use capture::CaptureManager;
pub use pipeline::{PipelineHandle, PipelineSettings, spawn_pipeline};
pub use recorder::{RecorderHandle, spawn_recorder};
