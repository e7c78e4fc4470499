use std::fmt;

use thiserror::Error;

use crate::browser::BrowserError;

use super::phase::WorkflowPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageElement {
    UploadRegion,
    FileInput,
    TitleField,
    ContentField,
    PublishButton,
}

impl fmt::Display for PageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageElement::UploadRegion => "upload region",
            PageElement::FileInput => "file input",
            PageElement::TitleField => "title field",
            PageElement::ContentField => "content field",
            PageElement::PublishButton => "publish button",
        };
        f.write_str(label)
    }
}

fn after_tab_switch(phase: &WorkflowPhase) -> &'static str {
    if *phase == WorkflowPhase::ImageUpload {
        " after tab switch"
    } else {
        ""
    }
}

/// Expected publish failures. The `Display` output is the operator message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishFailure {
    #[error("login required: {0}")]
    AuthRequired(String),
    #[error("publish page {url} did not load in time")]
    NetworkTimeout { url: String },
    #[error("{element} not found during {phase}{}", after_tab_switch(.phase))]
    ElementNotFound {
        phase: WorkflowPhase,
        element: PageElement,
    },
    #[error("media upload failed during {phase}: {reason}")]
    UploadFailure { phase: WorkflowPhase, reason: String },
    #[error("could not switch to the \"{0}\" tab")]
    TabSwitchFailed(String),
    #[error("publish rejected: {0}")]
    SubmitRejected(String),
    #[error("invalid publish request: {0}")]
    InvalidRequest(String),
    #[error("unexpected error during {phase}: {reason}")]
    Unclassified { phase: WorkflowPhase, reason: String },
}

impl PublishFailure {
    pub fn not_found(phase: WorkflowPhase, element: PageElement) -> Self {
        PublishFailure::ElementNotFound { phase, element }
    }

    /// Converts a host error escaping a phase.
    pub fn from_browser(phase: WorkflowPhase, err: BrowserError) -> Self {
        match err {
            BrowserError::NetworkTimeout { url } => PublishFailure::NetworkTimeout { url },
            BrowserError::AuthRequired(reason) => PublishFailure::AuthRequired(reason),
            other => PublishFailure::Unclassified {
                phase,
                reason: other.to_string(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PublishFailure::AuthRequired(_) => "auth_required",
            PublishFailure::NetworkTimeout { .. } => "network_timeout",
            PublishFailure::ElementNotFound { .. } => "element_not_found",
            PublishFailure::UploadFailure { .. } => "upload_failure",
            PublishFailure::TabSwitchFailed(_) => "tab_switch_failed",
            PublishFailure::SubmitRejected(_) => "submit_rejected",
            PublishFailure::InvalidRequest(_) => "invalid_request",
            PublishFailure::Unclassified { .. } => "unclassified",
        }
    }
}
