pub mod orchestrator;

pub use orchestrator::{EnvironmentInfo, ExecutionOrchestrator, ExecutionReport};
