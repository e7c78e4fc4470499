use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::PublishFailure;
use super::phase::WorkflowPhase;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MediaAttachment {
    #[default]
    None,
    Images(Vec<PathBuf>),
    Video(Vec<PathBuf>),
}

impl MediaAttachment {
    pub fn label(&self) -> &'static str {
        match self {
            MediaAttachment::None => "text",
            MediaAttachment::Images(_) => "images",
            MediaAttachment::Video(_) => "video",
        }
    }
}

/// Validated publish input, consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub media: MediaAttachment,
    /// `None` leaves the platform default visibility untouched.
    pub is_private: Option<bool>,
}

impl PublishRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            media: MediaAttachment::None,
            is_private: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = media;
        self
    }

    pub fn with_privacy(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }
}

/// Caller-supplied publish parameters before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishParams {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub images: Vec<PathBuf>,
    pub videos: Vec<PathBuf>,
    pub is_private: Option<bool>,
}

impl TryFrom<PublishParams> for PublishRequest {
    type Error = PublishFailure;

    fn try_from(params: PublishParams) -> Result<Self, Self::Error> {
        if params.title.trim().is_empty() {
            return Err(PublishFailure::InvalidRequest(
                "title must not be empty".into(),
            ));
        }
        let media = match (params.images.is_empty(), params.videos.is_empty()) {
            (true, true) => MediaAttachment::None,
            (false, true) => MediaAttachment::Images(params.images),
            (true, false) => MediaAttachment::Video(params.videos),
            (false, false) => {
                return Err(PublishFailure::InvalidRequest(
                    "images and videos cannot be published together".into(),
                ))
            }
        };
        let tags = params
            .tags
            .into_iter()
            .map(|tag| tag.trim().trim_start_matches('#').to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        Ok(PublishRequest {
            title: params.title,
            content: params.content,
            tags,
            media,
            is_private: params.is_private,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// A success indicator was observed after submitting.
    Confirmed,
    /// Submitted, but neither a success nor an error indicator appeared.
    Unconfirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub confirmation: Confirmation,
    pub trace: Vec<WorkflowPhase>,
}

impl PublishOutcome {
    pub fn confirmed(url: Option<String>, trace: Vec<WorkflowPhase>) -> Self {
        Self {
            success: true,
            message: "note published successfully".into(),
            url,
            confirmation: Confirmation::Confirmed,
            trace,
        }
    }

    pub fn unconfirmed(trace: Vec<WorkflowPhase>) -> Self {
        Self {
            success: true,
            message: "note submitted; no success or error indicator was shown, verify it on the profile page".into(),
            url: None,
            confirmation: Confirmation::Unconfirmed,
            trace,
        }
    }

    pub fn failed(failure: &PublishFailure, trace: Vec<WorkflowPhase>) -> Self {
        Self {
            success: false,
            message: failure.to_string(),
            url: None,
            confirmation: Confirmation::Failed,
            trace,
        }
    }

    pub fn reached(&self, phase: WorkflowPhase) -> bool {
        self.trace.contains(&phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_pick_media_branch() {
        let request = PublishRequest::try_from(PublishParams {
            title: "春日穿搭".into(),
            images: vec!["a.jpg".into(), "b.jpg".into()],
            ..PublishParams::default()
        })
        .unwrap();
        assert_eq!(
            request.media,
            MediaAttachment::Images(vec!["a.jpg".into(), "b.jpg".into()])
        );

        let request = PublishRequest::try_from(PublishParams {
            title: "vlog".into(),
            ..PublishParams::default()
        })
        .unwrap();
        assert_eq!(request.media, MediaAttachment::None);
    }

    #[test]
    fn both_media_kinds_are_rejected() {
        let err = PublishRequest::try_from(PublishParams {
            title: "mixed".into(),
            images: vec!["a.jpg".into()],
            videos: vec!["b.mp4".into()],
            ..PublishParams::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = PublishRequest::try_from(PublishParams {
            title: "  ".into(),
            ..PublishParams::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn tags_drop_hash_prefix_and_blanks() {
        let request = PublishRequest::try_from(PublishParams {
            title: "t".into(),
            tags: vec!["#旅行".into(), " ".into(), "美食".into()],
            ..PublishParams::default()
        })
        .unwrap();
        assert_eq!(request.tags, vec!["旅行", "美食"]);
    }

    #[test]
    fn failed_outcome_carries_message() {
        let outcome = PublishOutcome::failed(
            &PublishFailure::TabSwitchFailed("上传图文".into()),
            vec![WorkflowPhase::Init],
        );
        assert!(!outcome.success);
        assert!(!outcome.message.is_empty());
        assert_eq!(outcome.confirmation, Confirmation::Failed);
    }
}
