#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use rednote_core::browser::{
    marker_selector, BrowserError, BrowserResult, BrowserSession, CookieRecord, CredentialStore,
    PageDriver, SessionFactory, WaitState,
};

/// Field values shown once the overlay for a search item opens.
pub type ItemFields = HashMap<String, String>;

#[derive(Debug, Default)]
pub struct OverlayScript {
    pub overlay: String,
    pub close_button: String,
    /// `None` means clicking that item never opens the overlay.
    pub items: Vec<Option<ItemFields>>,
}

/// Scripted DOM. Selectors are matched verbatim.
#[derive(Debug, Default)]
pub struct PageState {
    pub url: String,
    /// Where `goto` lands when set, e.g. a login redirect.
    pub redirect: Option<String>,
    pub present: HashSet<String>,
    pub texts: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
    pub counts: HashMap<String, usize>,
    /// `(scope, phrase)` pairs visible on the page.
    pub phrases: Vec<(Option<String>, String)>,
    pub within: HashMap<(String, usize, String), String>,
    /// Operation names that fail with a host error. `op:selector` fails the
    /// operation only for that selector.
    pub failing: HashSet<String>,
    pub overlay: Option<OverlayScript>,
    /// Clicking the key selector moves the page to the value URL.
    pub click_navigates: HashMap<String, String>,
    pub calls: Vec<String>,
    pub cookies: Vec<CookieRecord>,
    pub screenshots: Vec<PathBuf>,
}

impl PageState {
    pub fn with_present<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.present.extend(selectors.into_iter().map(Into::into));
        self
    }

    pub fn with_phrase(mut self, scope: Option<&str>, phrase: &str) -> Self {
        self.phrases
            .push((scope.map(str::to_string), phrase.to_string()));
        self
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.present.insert(selector.to_string());
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn failing(mut self, operation: &str) -> Self {
        self.failing.insert(operation.to_string());
        self
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.iter().any(|call| call.starts_with(prefix))
    }

    pub fn calls_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct SharedPage(Arc<Mutex<PageState>>);

impl SharedPage {
    pub fn new(state: PageState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn state(&self) -> MutexGuard<'_, PageState> {
        self.0.lock().unwrap()
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
}

impl Counters {
    pub fn balanced(&self) -> bool {
        self.sessions_opened.load(Ordering::SeqCst) == self.sessions_closed.load(Ordering::SeqCst)
            && self.pages_opened.load(Ordering::SeqCst) == self.pages_closed.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }
}

pub struct FixturePage {
    shared: SharedPage,
    counters: Arc<Counters>,
}

impl FixturePage {
    fn record(&self, call: String) -> MutexGuard<'_, PageState> {
        let mut state = self.shared.state();
        state.calls.push(call);
        state
    }

    fn check(state: &PageState, operation: &str) -> BrowserResult<()> {
        if state.failing.contains(operation) {
            Err(BrowserError::Unexpected(format!("{operation} failed")))
        } else {
            Ok(())
        }
    }

    fn check_on(state: &PageState, operation: &str, selector: &str) -> BrowserResult<()> {
        Self::check(state, operation)?;
        Self::check(state, &format!("{operation}:{selector}"))
    }
}

#[async_trait(?Send)]
impl PageDriver for FixturePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> BrowserResult<()> {
        let mut state = self.record(format!("goto:{url}"));
        if state.failing.contains("goto") {
            return Err(BrowserError::NetworkTimeout {
                url: url.to_string(),
            });
        }
        state.url = state.redirect.clone().unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let state = self.shared.state();
        Self::check(&state, "current_url")?;
        Ok(state.url.clone())
    }

    async fn wait_for(
        &self,
        selector: &str,
        wait: WaitState,
        _timeout: Duration,
    ) -> BrowserResult<bool> {
        let state = self.record(format!("wait_for:{selector}"));
        Self::check(&state, "wait_for")?;
        let present = state.present.contains(selector);
        Ok(match wait {
            WaitState::Attached => present,
            WaitState::Detached => !present,
        })
    }

    async fn count(&self, selector: &str) -> BrowserResult<usize> {
        let state = self.record(format!("count:{selector}"));
        if let Some(count) = state.counts.get(selector) {
            return Ok(*count);
        }
        Ok(usize::from(state.present.contains(selector)))
    }

    async fn mark_text(
        &self,
        scope: Option<&str>,
        phrase: &str,
        marker: &str,
    ) -> BrowserResult<bool> {
        let mut state = self.record(format!("mark_text:{phrase}"));
        let found = state.phrases.iter().any(|(entry_scope, entry)| {
            entry == phrase && (scope.is_none() || entry_scope.as_deref() == scope)
        });
        if found {
            state.present.insert(marker_selector(marker));
        }
        Ok(found)
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        let mut state = self.record(format!("click:{selector}"));
        Self::check_on(&state, "click", selector)?;
        if !state.present.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        if let Some(url) = state.click_navigates.get(selector).cloned() {
            state.url = url;
        }
        let close = state
            .overlay
            .as_ref()
            .filter(|script| script.close_button == selector)
            .map(|script| script.overlay.clone());
        if let Some(overlay) = close {
            state.present.remove(&overlay);
        }
        Ok(())
    }

    async fn activate(&self, selector: &str) -> BrowserResult<()> {
        let state = self.record(format!("activate:{selector}"));
        Self::check(&state, "activate")?;
        if state.present.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn click_text(&self, text: &str) -> BrowserResult<()> {
        let state = self.record(format!("click_text:{text}"));
        let wanted = normalize(text);
        if state
            .phrases
            .iter()
            .any(|(_, phrase)| normalize(phrase).contains(&wanted))
        {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(format!("text={text}")))
        }
    }

    async fn click_within(&self, item: &str, index: usize, child: &str) -> BrowserResult<()> {
        let mut state = self.record(format!("click_within:{item}[{index}] {child}"));
        Self::check(&state, "click_within")?;
        let opened = state
            .overlay
            .as_ref()
            .and_then(|script| script.items.get(index).cloned().flatten().map(|f| (script.overlay.clone(), f)));
        if let Some((overlay, fields)) = opened {
            state.present.insert(overlay);
            for (selector, value) in fields {
                state.present.insert(selector.clone());
                state.texts.insert(selector, value);
            }
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        let state = self.record(format!("fill:{selector}={value}"));
        Self::check_on(&state, "fill", selector)
    }

    async fn press_key(&self, selector: &str, key: &str) -> BrowserResult<()> {
        let state = self.record(format!("press_key:{selector}={key}"));
        Self::check(&state, "press_key")
    }

    async fn set_files(&self, selector: &str, files: &[PathBuf]) -> BrowserResult<()> {
        let state = self.record(format!("set_files:{selector}={}", files.len()));
        Self::check(&state, "set_files")
    }

    async fn read_text(&self, selector: &str) -> BrowserResult<Option<String>> {
        let state = self.record(format!("read_text:{selector}"));
        Self::check(&state, "read_text")?;
        Ok(state.texts.get(selector).cloned())
    }

    async fn read_all_text(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let state = self.record(format!("read_all_text:{selector}"));
        Ok(state.lists.get(selector).cloned().unwrap_or_default())
    }

    async fn read_text_within(
        &self,
        item: &str,
        index: usize,
        field: &str,
    ) -> BrowserResult<Option<String>> {
        let state = self.record(format!("read_text_within:{item}[{index}] {field}"));
        Ok(state
            .within
            .get(&(item.to_string(), index, field.to_string()))
            .cloned())
    }

    async fn add_cookies(&self, cookies: &[CookieRecord]) -> BrowserResult<()> {
        let mut state = self.record("add_cookies".to_string());
        Self::check(&state, "add_cookies")?;
        state.cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        let mut state = self.record(format!("screenshot:{}", path.display()));
        state.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        let state = self.record("close_page".to_string());
        Self::check(&state, "close_page")
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct FixtureSession {
    shared: SharedPage,
    counters: Arc<Counters>,
}

#[async_trait(?Send)]
impl BrowserSession for FixtureSession {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageDriver>> {
        if self.shared.state().failing.contains("new_page") {
            return Err(BrowserError::Unexpected("new_page failed".into()));
        }
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixturePage {
            shared: self.shared.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out sessions whose pages all share one scripted DOM.
pub struct FixtureSessionFactory {
    pub page: SharedPage,
    pub counters: Arc<Counters>,
}

impl FixtureSessionFactory {
    pub fn new(state: PageState) -> Self {
        Self {
            page: SharedPage::new(state),
            counters: Arc::new(Counters::default()),
        }
    }
}

#[async_trait(?Send)]
impl SessionFactory for FixtureSessionFactory {
    async fn open(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        self.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureSession {
            shared: self.page.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

pub struct MemoryCookies(pub Vec<CookieRecord>);

#[async_trait(?Send)]
impl CredentialStore for MemoryCookies {
    async fn stored_cookies(&self) -> BrowserResult<Vec<CookieRecord>> {
        Ok(self.0.clone())
    }
}

pub fn session_cookie() -> CookieRecord {
    CookieRecord {
        name: "web_session".into(),
        value: "fixture".into(),
        domain: "xiaohongshu.com".into(),
        path: "/".into(),
        expires: None,
        http_only: true,
        secure: true,
        same_site: Some("Lax".into()),
    }
}
