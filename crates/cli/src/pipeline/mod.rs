//! Run orchestration.

mod orchestrator;
mod scenario;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use scenario::DemoScenario;
