use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::browser::LocateStrategy;
use crate::error::{ConfigError, Result};

/// Jitter bounds in milliseconds, `[min, max]`.
pub type JitterRange = [u64; 2];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RednoteConfig {
    pub site: SiteSection,
    pub browser: BrowserSection,
    pub session: SessionSection,
    pub timeouts: TimeoutSection,
    pub pacing: PacingSection,
    pub selectors: SelectorSection,
    pub schema: SchemaSection,
    pub diagnostics: DiagnosticsSection,
}

impl RednoteConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, range) in self.pacing.ranges() {
            if range[0] > range[1] {
                return Err(ConfigError::invalid(
                    format!("pacing.{field}"),
                    format!("min {} exceeds max {}", range[0], range[1]),
                ));
            }
        }
        let lists = [
            ("selectors.title", &self.selectors.title),
            ("selectors.content", &self.selectors.content),
            ("selectors.publish_button", &self.selectors.publish_button),
            ("schema.search.container", &self.schema.search.container),
            ("schema.search.overlay", &self.schema.search.overlay),
            ("schema.search.close_button", &self.schema.search.close_button),
            ("schema.note.container", &self.schema.note.container),
            ("schema.comments.container", &self.schema.comments.container),
        ];
        for (field, list) in lists {
            if list.is_empty() {
                return Err(ConfigError::invalid(field, "candidate list is empty"));
            }
        }
        if !self.site.search_url_template.contains("{keyword}") {
            return Err(ConfigError::invalid(
                "site.search_url_template",
                "missing {keyword} placeholder",
            ));
        }
        Ok(())
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, base_dir: &Path, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub home_url: String,
    pub search_url_template: String,
    pub publish_url: String,
    pub login_path_marker: String,
    pub image_tab_label: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            home_url: "https://www.xiaohongshu.com".into(),
            search_url_template: "https://www.xiaohongshu.com/search_result?keyword={keyword}"
                .into(),
            publish_url: "https://creator.xiaohongshu.com/publish/publish".into(),
            login_path_marker: "/login".into(),
            image_tab_label: "上传图文".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: Option<String>,
    pub user_data_dir: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub viewport: [u32; 2],
    pub user_agent: Option<String>,
    pub lang: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            user_data_dir: None,
            headless: true,
            sandbox: true,
            disable_gpu: false,
            viewport: [1366, 900],
            user_agent: None,
            lang: Some("zh-CN".into()),
            request_timeout_seconds: Some(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub cookie_file: String,
    pub verify_login: bool,
    pub logged_in_selector: String,
    pub logged_in_text: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            cookie_file: ".rednote/cookies.json".into(),
            verify_login: true,
            logged_in_selector: ".user.side-bar-component .channel".into(),
            logged_in_text: "我".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub navigation_ms: u64,
    pub login_indicator_ms: u64,
    pub tab_label_ms: u64,
    pub upload_region_ms: u64,
    pub video_preview_ms: u64,
    pub image_preview_ms: u64,
    pub field_candidate_ms: u64,
    pub submit_candidate_ms: u64,
    pub result_indicator_ms: u64,
    pub container_ms: u64,
    pub overlay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            login_indicator_ms: 0,
            tab_label_ms: 2_000,
            upload_region_ms: 15_000,
            video_preview_ms: 30_000,
            image_preview_ms: 15_000,
            field_candidate_ms: 5_000,
            submit_candidate_ms: 5_000,
            result_indicator_ms: 5_000,
            container_ms: 30_000,
            overlay_ms: 30_000,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub enabled: bool,
    pub auth_settle_ms: JitterRange,
    pub media_settle_ms: JitterRange,
    pub tab_switch_ms: JitterRange,
    pub video_processing_ms: JitterRange,
    pub video_preview_grace_ms: JitterRange,
    pub image_processing_ms: JitterRange,
    pub image_preview_grace_ms: JitterRange,
    pub text_only_ms: JitterRange,
    pub form_settle_ms: JitterRange,
    pub tag_interval_ms: JitterRange,
    pub pre_submit_ms: JitterRange,
    pub post_submit_ms: JitterRange,
    pub overlay_open_ms: JitterRange,
    pub overlay_close_ms: JitterRange,
    pub between_items_ms: JitterRange,
}

impl PacingSection {
    fn ranges(&self) -> [(&'static str, JitterRange); 15] {
        [
            ("auth_settle_ms", self.auth_settle_ms),
            ("media_settle_ms", self.media_settle_ms),
            ("tab_switch_ms", self.tab_switch_ms),
            ("video_processing_ms", self.video_processing_ms),
            ("video_preview_grace_ms", self.video_preview_grace_ms),
            ("image_processing_ms", self.image_processing_ms),
            ("image_preview_grace_ms", self.image_preview_grace_ms),
            ("text_only_ms", self.text_only_ms),
            ("form_settle_ms", self.form_settle_ms),
            ("tag_interval_ms", self.tag_interval_ms),
            ("pre_submit_ms", self.pre_submit_ms),
            ("post_submit_ms", self.post_submit_ms),
            ("overlay_open_ms", self.overlay_open_ms),
            ("overlay_close_ms", self.overlay_close_ms),
            ("between_items_ms", self.between_items_ms),
        ]
    }
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            auth_settle_ms: [3_000, 5_000],
            media_settle_ms: [2_000, 3_000],
            tab_switch_ms: [3_000, 5_000],
            video_processing_ms: [8_000, 12_000],
            video_preview_grace_ms: [5_000, 8_000],
            image_processing_ms: [3_000, 5_000],
            image_preview_grace_ms: [3_000, 5_000],
            text_only_ms: [2_000, 3_000],
            form_settle_ms: [2_000, 3_000],
            tag_interval_ms: [500, 1_000],
            pre_submit_ms: [2_000, 3_000],
            post_submit_ms: [3_000, 5_000],
            overlay_open_ms: [500, 1_500],
            overlay_close_ms: [500, 1_000],
            between_items_ms: [500, 1_500],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub login_indicators: Vec<LocateStrategy>,
    pub upload_region: String,
    pub file_input: String,
    pub video_preview: String,
    pub image_preview: String,
    pub title: Vec<LocateStrategy>,
    pub content: Vec<LocateStrategy>,
    pub tag_input: String,
    pub privacy_private: String,
    pub privacy_public: String,
    pub publish_button: Vec<LocateStrategy>,
    pub success_indicators: Vec<LocateStrategy>,
    pub error_indicators: String,
}

fn strategies(raw: &[&str]) -> Vec<LocateStrategy> {
    raw.iter().map(|value| LocateStrategy::parse(value)).collect()
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            login_indicators: strategies(&[
                r#"button:has-text("登录")"#,
                r#".login-btn, .login-button, input[type="submit"][value*="登录"]"#,
                r#"form[class*="login"], .login-form, .login-container"#,
                r#".qrcode, .qr-code, [class*="qrcode"]"#,
            ]),
            upload_region: r#"input[type="file"], [class*="upload"], .upload-area, .dnd-area"#
                .into(),
            file_input: r#"input[type="file"]"#.into(),
            video_preview:
                r#"video, .video-preview, [class*="video"], [class*="preview"], .upload-success"#
                    .into(),
            image_preview:
                r#"img, .preview, [class*="preview"], [class*="image"], .upload-success"#.into(),
            title: strategies(&[
                r#"input[placeholder*="标题"]"#,
                r#"input[type="text"].d-text"#,
                r#"input[type="text"]:first-of-type"#,
                r#"input[placeholder*="请输入标题"]"#,
                r#"input[placeholder*="添加标题"]"#,
            ]),
            content: strategies(&[
                r#"div[contenteditable="true"]:not([placeholder*="标题"])"#,
                r#"div[contenteditable="true"]"#,
                r#"textarea[placeholder*="描述"]"#,
                r#"textarea[placeholder*="请输入正文"]"#,
                r#"textarea[placeholder*="添加描述"]"#,
                "textarea",
            ]),
            tag_input: r#"input[placeholder*="标签"], input[placeholder*="话题"], .tag-input input, [data-testid="tag-input"]"#.into(),
            privacy_private:
                r#"[data-testid="private-radio"], input[value="private"], .privacy-private"#.into(),
            privacy_public:
                r#"[data-testid="public-radio"], input[value="public"], .privacy-public"#.into(),
            publish_button: strategies(&[
                "button.publishBtn",
                r#"button:has-text("发布")"#,
                r#"button:has-text("立即发布")"#,
                r#"button[type="submit"]"#,
                ".publish-btn",
                ".submit-btn",
            ]),
            success_indicators: strategies(&[
                ".success-message",
                ".publish-success",
                "text=发布成功",
                "text=已发布",
                r#"[data-testid="success-message"]"#,
            ]),
            error_indicators: r#".error-message, .publish-error, [class*="error"]"#.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaSection {
    pub search: SearchSchema,
    pub note: NoteSchema,
    pub comments: CommentSchema,
}

/// Container, overlay and close button are ranked candidate lists; item and
/// cover stay plain CSS because they are addressed by index.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSchema {
    pub container: Vec<LocateStrategy>,
    pub item: String,
    pub cover: String,
    pub overlay: Vec<LocateStrategy>,
    pub close_button: Vec<LocateStrategy>,
}

impl Default for SearchSchema {
    fn default() -> Self {
        Self {
            container: strategies(&[".feeds-container"]),
            item: ".feeds-container .note-item".into(),
            cover: "a.cover.mask.ld".into(),
            overlay: strategies(&["#noteContainer"]),
            close_button: strategies(&[".close-circle"]),
        }
    }
}

/// Field candidates for a note rendered as overlay or as a standalone page.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoteSchema {
    pub container: Vec<LocateStrategy>,
    pub title: Vec<LocateStrategy>,
    pub content: Vec<LocateStrategy>,
    pub tags: String,
    pub author: Vec<LocateStrategy>,
    pub likes: Vec<LocateStrategy>,
    pub collects: Vec<LocateStrategy>,
    pub comments: Vec<LocateStrategy>,
    pub published_at: Vec<LocateStrategy>,
}

impl Default for NoteSchema {
    fn default() -> Self {
        Self {
            container: strategies(&["#noteContainer", ".note-detail-mask"]),
            title: strategies(&["#noteContainer #detail-title", "#detail-title"]),
            content: strategies(&[
                "#noteContainer #detail-desc .note-text",
                "#detail-desc .note-text",
                "#detail-desc",
            ]),
            tags: "#noteContainer #detail-desc a.tag".into(),
            author: strategies(&[
                "#noteContainer .author-wrapper .username",
                ".author-wrapper .username",
            ]),
            likes: strategies(&[".engage-bar-style .like-wrapper .count"]),
            collects: strategies(&[".engage-bar-style .collect-wrapper .count"]),
            comments: strategies(&[".engage-bar-style .chat-wrapper .count"]),
            published_at: strategies(&["#noteContainer .bottom-container .date", ".bottom-container .date"]),
        }
    }
}

/// Comment fields are resolved relative to each list item.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommentSchema {
    pub container: Vec<LocateStrategy>,
    pub item: String,
    pub author: String,
    pub content: String,
    pub likes: String,
    pub time: String,
}

impl Default for CommentSchema {
    fn default() -> Self {
        Self {
            container: strategies(&[r#"[role="dialog"] [role="list"]"#]),
            item: r#"[role="dialog"] [role="list"] [role="listitem"]"#.into(),
            author: r#"[data-testid="user-name"]"#.into(),
            content: r#"[data-testid="comment-content"]"#.into(),
            likes: r#"[data-testid="likes-count"]"#.into(),
            time: "time".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSection {
    pub screenshot_dir: Option<String>,
}

pub fn load_rednote_config<P: AsRef<Path>>(path: P) -> Result<RednoteConfig> {
    let config: RednoteConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/rednote.toml");
        let config = load_rednote_config(path).expect("config should parse");
        assert_eq!(
            config.site.publish_url,
            "https://creator.xiaohongshu.com/publish/publish"
        );
        assert_eq!(config.timeouts.navigation_ms, 30_000);
        assert_eq!(config.pacing.video_processing_ms, [8_000, 12_000]);
        assert_eq!(config.selectors.title.len(), 5);
        assert!(matches!(
            config.selectors.success_indicators[2],
            LocateStrategy::Text { ref phrase, scope: None } if phrase == "发布成功"
        ));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pacing]\nenabled = false\n\n[site]\nlogin_path_marker = \"/signin\"").unwrap();
        let config = load_rednote_config(file.path()).unwrap();
        assert!(!config.pacing.enabled);
        assert_eq!(config.site.login_path_marker, "/signin");
        assert_eq!(config.schema.search.item, ".feeds-container .note-item");
        assert_eq!(config.selectors.content.len(), 6);
    }

    #[test]
    fn inverted_jitter_range_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pacing]\npre_submit_ms = [3000, 2000]").unwrap();
        let err = load_rednote_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "pacing.pre_submit_ms"));
    }

    #[test]
    fn empty_candidate_list_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[selectors]\ntitle = []").unwrap();
        let err = load_rednote_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("selectors.title"));
    }

    #[test]
    fn schema_fields_accept_ranked_candidates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[schema.note]\ntitle = [\"#detail-title\", \"h1.title\"]\ncontainer = []"
        )
        .unwrap();
        let err = load_rednote_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("schema.note.container"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[schema.note]\ntitle = [\"#detail-title\", \"h1.title\"]").unwrap();
        let config = load_rednote_config(file.path()).unwrap();
        assert_eq!(
            config.schema.note.title,
            vec![LocateStrategy::css("#detail-title"), LocateStrategy::css("h1.title")]
        );
    }
}
