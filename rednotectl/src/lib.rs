use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use rednote_core::browser::BrowserError;
use rednote_core::{
    load_rednote_config, ExtractedComment, ExtractedNote, PublishOutcome, PublishParams,
    RednoteClient, RednoteConfig,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] rednote_core::ConfigError),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "RedNote search, scraping and publishing from the command line", long_about = None)]
pub struct Cli {
    /// Path to rednote.toml
    #[arg(long, default_value = "configs/rednote.toml")]
    pub config: PathBuf,
    /// Cookie file override (replaces session.cookie_file)
    #[arg(long)]
    pub cookies: Option<PathBuf>,
    /// Show the browser window
    #[arg(long, default_value_t = false)]
    pub headed: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search notes by keyword
    Search(SearchArgs),
    /// Read one note from its URL or copied share text
    Detail(DetailArgs),
    /// Read the comments of a note
    Comments(DetailArgs),
    /// Publish a note
    Publish(PublishArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search keywords
    #[arg(required = true, num_args = 1..)]
    pub keywords: Vec<String>,
    /// Maximum number of notes to read
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct DetailArgs {
    /// Note URL or share text containing one
    pub url: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("body").required(true).args(["content", "content_file"])))]
#[command(group(ArgGroup::new("visibility").args(["private", "public"])))]
pub struct PublishArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub content: Option<String>,
    /// Read the note body from a file
    #[arg(long)]
    pub content_file: Option<PathBuf>,
    /// Topic tag, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Image to attach, repeatable
    #[arg(long = "image")]
    pub images: Vec<PathBuf>,
    /// Video to attach, repeatable
    #[arg(long = "video")]
    pub videos: Vec<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub private: bool,
    #[arg(long, default_value_t = false)]
    pub public: bool,
}

impl PublishArgs {
    pub fn to_params(&self) -> Result<PublishParams> {
        let content = match (&self.content, &self.content_file) {
            (Some(content), _) => content.clone(),
            (None, Some(path)) => fs::read_to_string(path)?,
            (None, None) => {
                return Err(AppError::InvalidArgument(
                    "either --content or --content-file is required".into(),
                ))
            }
        };
        for path in self.images.iter().chain(&self.videos) {
            if !path.is_file() {
                return Err(AppError::InvalidArgument(format!(
                    "media file not found: {}",
                    path.display()
                )));
            }
        }
        let is_private = match (self.private, self.public) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        };
        Ok(PublishParams {
            title: self.title.clone(),
            content,
            tags: self.tags.clone(),
            images: self.images.clone(),
            videos: self.videos.clone(),
            is_private,
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Load and validate the configuration
    Check,
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_rednote_config(&cli.config)?;
    let context = AppContext::new(&cli, config);

    if let Commands::Config(ConfigCommands::Check) = &cli.command {
        let report = context.config_report();
        return render(&report, cli.format);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(context.execute(&cli.command, cli.format))
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: RednoteConfig,
    config_path: PathBuf,
    base_dir: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli, mut config: RednoteConfig) -> Self {
        let config_path = cli.config.clone();
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if let Some(cookies) = &cli.cookies {
            config.session.cookie_file = cookies.display().to_string();
        }
        if cli.headed {
            config.browser.headless = false;
        }
        Self {
            config,
            config_path,
            base_dir,
        }
    }

    fn cookie_path(&self) -> PathBuf {
        self.config
            .resolve_path(&self.base_dir, &self.config.session.cookie_file)
    }

    fn config_report(&self) -> ConfigReport {
        let cookie_file = self.cookie_path();
        ConfigReport {
            config_path: self.config_path.display().to_string(),
            publish_url: self.config.site.publish_url.clone(),
            cookie_file_exists: cookie_file.is_file(),
            cookie_file: cookie_file.display().to_string(),
            headless: self.config.browser.headless,
            pacing_enabled: self.config.pacing.enabled,
            title_candidates: self.config.selectors.title.len(),
            content_candidates: self.config.selectors.content.len(),
            publish_candidates: self.config.selectors.publish_button.len(),
            checked_at: Utc::now(),
        }
    }

    async fn execute(&self, command: &Commands, format: OutputFormat) -> Result<()> {
        let client = RednoteClient::chromium(self.config.clone(), &self.base_dir);
        match command {
            Commands::Search(args) => {
                let keywords = args.keywords.join(" ");
                let notes = client.search(&keywords, args.limit).await?;
                render(&notes, format)?;
            }
            Commands::Detail(args) => {
                let note = client.get_detail(&args.url).await?;
                render(&note, format)?;
            }
            Commands::Comments(args) => {
                let comments = client.get_comments(&args.url).await?;
                render(&comments, format)?;
            }
            Commands::Publish(args) => {
                let params = args.to_params()?;
                let outcome = client.publish_params(params).await;
                render(&outcome, format)?;
                if !outcome.success {
                    return Err(AppError::PublishFailed(outcome.message));
                }
            }
            Commands::Config(ConfigCommands::Check) => {
                render(&self.config_report(), format)?;
            }
        }
        let metrics = client.metrics();
        info!(
            sessions = metrics.sessions_opened,
            jitter_ms = metrics.jitter_ms,
            release_failures = metrics.release_failures,
            "command finished"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    config_path: String,
    publish_url: String,
    cookie_file: String,
    cookie_file_exists: bool,
    headless: bool,
    pacing_enabled: bool,
    title_candidates: usize,
    content_candidates: usize,
    publish_candidates: usize,
    checked_at: DateTime<Utc>,
}

impl DisplayFallback for ConfigReport {
    fn display(&self) -> String {
        let cookies = if self.cookie_file_exists {
            "present"
        } else {
            "missing, run the login flow first"
        };
        format!(
            "Config: {}\nPublish URL: {}\nCookies: {} ({})\nHeadless: {}\nPacing: {}\nCandidates: title={} content={} publish={}",
            self.config_path,
            self.publish_url,
            self.cookie_file,
            cookies,
            self.headless,
            if self.pacing_enabled { "on" } else { "off" },
            self.title_candidates,
            self.content_candidates,
            self.publish_candidates
        )
    }
}

impl DisplayFallback for ExtractedNote {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("{} by {}", self.title, self.author),
            format!(
                "likes={} collects={} comments={}",
                self.likes, self.collects, self.comments
            ),
        ];
        if !self.url.is_empty() {
            lines.push(self.url.clone());
        }
        if !self.tags.is_empty() {
            lines.push(
                self.tags
                    .iter()
                    .map(|tag| format!("#{tag}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        if !self.published_at.is_empty() {
            lines.push(self.published_at.clone());
        }
        if !self.content.is_empty() {
            lines.push(String::new());
            lines.push(self.content.clone());
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<ExtractedNote> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No notes found".to_string();
        }
        self.iter()
            .enumerate()
            .map(|(idx, note)| format!("[{}] {}", idx + 1, note.display()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl DisplayFallback for Vec<ExtractedComment> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No comments".to_string();
        }
        self.iter()
            .map(|comment| {
                format!(
                    "{} ({}, {} likes): {}",
                    comment.author, comment.time, comment.likes, comment.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for PublishOutcome {
    fn display(&self) -> String {
        let status = if self.success { "OK" } else { "FAILED" };
        let mut text = format!("{status}: {}", self.message);
        if let Some(url) = &self.url {
            text.push_str(&format!("\nURL: {url}"));
        }
        text
    }
}
