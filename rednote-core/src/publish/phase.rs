use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::PublishFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Init,
    Navigate,
    AuthCheck,
    VideoUpload,
    TabSwitch,
    ImageUpload,
    MediaSkip,
    FormFill,
    TagEntry,
    PrivacySet,
    Submit,
    ResultClassify,
    Cleanup,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Init => "init",
            WorkflowPhase::Navigate => "navigate",
            WorkflowPhase::AuthCheck => "auth_check",
            WorkflowPhase::VideoUpload => "video_upload",
            WorkflowPhase::TabSwitch => "tab_switch",
            WorkflowPhase::ImageUpload => "image_upload",
            WorkflowPhase::MediaSkip => "media_skip",
            WorkflowPhase::FormFill => "form_fill",
            WorkflowPhase::TagEntry => "tag_entry",
            WorkflowPhase::PrivacySet => "privacy_set",
            WorkflowPhase::Submit => "submit",
            WorkflowPhase::ResultClassify => "result_classify",
            WorkflowPhase::Cleanup => "cleanup",
        }
    }

}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a phase ended. `SoftFail` is logged and the workflow continues;
/// `HardFail` skips every remaining phase except cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    Continue,
    SoftFail(String),
    HardFail(PublishFailure),
}

impl PhaseResult {
    pub fn soft(reason: impl Into<String>) -> Self {
        PhaseResult::SoftFail(reason.into())
    }
}
