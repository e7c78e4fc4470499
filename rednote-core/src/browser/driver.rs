//! Browser capability consumed by the automation core.
//!
//! Every operation addresses elements by CSS selector; free-text matches are
//! first tagged with a marker attribute by [`PageDriver::mark_text`] so the
//! same selector-based operations can reach them afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::BrowserResult;

/// Attribute written onto elements located through a free-text scan.
pub const MARKER_ATTRIBUTE: &str = "data-rednote-marker";

pub fn marker_selector(marker: &str) -> String {
    format!("[{MARKER_ATTRIBUTE}=\"{marker}\"]")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Attached,
    Detached,
}

/// Cookie as handed to the browser; `domain` may carry a leading dot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[async_trait(?Send)]
pub trait PageDriver {
    /// Loads `url` and waits for DOM content to be ready.
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<String>;

    /// Resolves `Ok(false)` when the wait window closes without the state
    /// being reached.
    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> BrowserResult<bool>;

    async fn count(&self, selector: &str) -> BrowserResult<usize>;

    /// Scans the DOM (optionally only elements matching `scope`) for the first
    /// element whose trimmed text equals `phrase` and tags it with `marker`.
    async fn mark_text(
        &self,
        scope: Option<&str>,
        phrase: &str,
        marker: &str,
    ) -> BrowserResult<bool>;

    async fn click(&self, selector: &str) -> BrowserResult<()>;

    /// Scrolls the element into view and dispatches a synthetic DOM click.
    async fn activate(&self, selector: &str) -> BrowserResult<()>;

    /// Real pointer click on the innermost element whose whitespace-collapsed
    /// text contains `text`. Looser than [`PageDriver::mark_text`], which
    /// needs an exact match.
    async fn click_text(&self, text: &str) -> BrowserResult<()>;

    /// Clicks `child` inside the `index`-th element matching `item`.
    async fn click_within(&self, item: &str, index: usize, child: &str) -> BrowserResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()>;

    async fn press_key(&self, selector: &str, key: &str) -> BrowserResult<()>;

    async fn set_files(&self, selector: &str, files: &[PathBuf]) -> BrowserResult<()>;

    /// Trimmed text of the first match, `None` when nothing matches.
    async fn read_text(&self, selector: &str) -> BrowserResult<Option<String>>;

    async fn read_all_text(&self, selector: &str) -> BrowserResult<Vec<String>>;

    async fn read_text_within(
        &self,
        item: &str,
        index: usize,
        field: &str,
    ) -> BrowserResult<Option<String>>;

    async fn add_cookies(&self, cookies: &[CookieRecord]) -> BrowserResult<()>;

    async fn screenshot(&self, path: &Path) -> BrowserResult<()>;

    async fn close(&self) -> BrowserResult<()>;
}

#[async_trait(?Send)]
pub trait BrowserSession {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageDriver>>;
    async fn close(&self) -> BrowserResult<()>;
}

#[async_trait(?Send)]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> BrowserResult<Box<dyn BrowserSession>>;
}

#[async_trait(?Send)]
pub trait CredentialStore: Send + Sync {
    async fn stored_cookies(&self) -> BrowserResult<Vec<CookieRecord>>;
}
