pub mod browser;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod publish;

pub use client::RednoteClient;
pub use config::{load_rednote_config, RednoteConfig};
pub use error::{ConfigError, Result};
pub use extract::{extract_note_url, ExtractedComment, ExtractedNote};
pub use publish::{
    Confirmation, MediaAttachment, PublishFailure, PublishOutcome, PublishParams, PublishRequest,
    WorkflowPhase,
};
