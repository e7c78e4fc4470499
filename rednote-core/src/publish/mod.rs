pub mod error;
pub mod models;
pub mod orchestrator;
pub mod phase;

pub use error::{PageElement, PublishFailure};
pub use models::{Confirmation, MediaAttachment, PublishOutcome, PublishParams, PublishRequest};
pub use orchestrator::PublishOrchestrator;
pub use phase::{PhaseResult, WorkflowPhase};
