use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, SetCookiesParams, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BrowserSection;

use super::driver::{
    marker_selector, BrowserSession, CookieRecord, PageDriver, SessionFactory, WaitState,
    MARKER_ATTRIBUTE,
};
use super::error::{BrowserError, BrowserResult};

const DOM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launches one Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Arc<BrowserSection>,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserSection) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BrowserSection {
        &self.config
    }

    fn build_chromium_config(&self) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.viewport;
        let mut builder = ChromiumConfig::builder().viewport(ChromiumViewport {
            width,
            height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: width >= height,
            has_touch: false,
        });

        if let Some(path) = &self.config.executable_path {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &self.config.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(seconds) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(seconds));
        }

        let mut args = vec![
            format!("--window-size={width},{height}"),
            "--no-first-run".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &self.config.lang {
            args.push(format!("--lang={lang}"));
        }
        if let Some(agent) = &self.config.user_agent {
            args.push(format!("--user-agent={agent}"));
        }
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[async_trait(?Send)]
impl SessionFactory for ChromiumLauncher {
    async fn open(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        let chromium_config = self.build_chromium_config()?;
        info!(
            headless = self.config.headless,
            width = self.config.viewport[0],
            height = self.config.viewport[1],
            "launching chromium instance"
        );
        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            browser: AsyncMutex::new(browser),
            handler_task: Mutex::new(Some(handler_task)),
            config: Arc::clone(&self.config),
        }))
    }
}

pub struct ChromiumSession {
    browser: AsyncMutex<Browser>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    config: Arc<BrowserSection>,
}

impl ChromiumSession {
    fn take_handler(&self) -> Option<JoinHandle<()>> {
        match self.handler_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait(?Send)]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageDriver>> {
        let page = self.browser.lock().await.new_page("about:blank").await?;
        if let Some(agent) = &self.config.user_agent {
            let mut params = SetUserAgentOverrideParams::builder().user_agent(agent.clone());
            if let Some(lang) = &self.config.lang {
                params = params.accept_language(lang.clone());
            }
            let params = params.build().map_err(BrowserError::Configuration)?;
            page.set_user_agent(params).await?;
        }
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> BrowserResult<()> {
        let result = self.browser.lock().await.close().await;
        if let Some(handle) = self.take_handler() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        result?;
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handle) = self.take_handler() {
            if !handle.is_finished() {
                warn!("chromium session dropped without explicit close");
                handle.abort();
            }
        }
    }
}

pub struct ChromiumPage {
    page: Page,
}

/// JSON literal for splicing a Rust string into a script.
fn js(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn element_text() -> &'static str {
    "(el) => (el ? (el.innerText || el.textContent || '').trim() : null)"
}

impl ChromiumPage {
    /// Evaluates `script`, which must return a JSON string, and decodes it.
    async fn eval<T: DeserializeOwned>(&self, script: String) -> BrowserResult<T> {
        let raw: String = self
            .page
            .evaluate(script.as_str())
            .await?
            .into_value()
            .map_err(|err| BrowserError::Unexpected(format!("script returned no value: {err}")))?;
        serde_json::from_str(&raw)
            .map_err(|err| BrowserError::Unexpected(format!("failed to decode script result: {err}")))
    }

    async fn present(&self, selector: &str) -> BrowserResult<bool> {
        self.eval(format!(
            "JSON.stringify(document.querySelector({}) !== null)",
            js(selector)
        ))
        .await
    }

    async fn click_marked(&self, marker: &str) -> BrowserResult<()> {
        self.page
            .find_element(marker_selector(marker))
            .await?
            .click()
            .await?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, limit: Duration) -> BrowserResult<()> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, BrowserError>(())
        };
        match timeout(limit, navigation).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::NetworkTimeout {
                url: url.to_string(),
            }),
        }
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        limit: Duration,
    ) -> BrowserResult<bool> {
        let deadline = Instant::now() + limit;
        loop {
            let present = self.present(selector).await?;
            let reached = match state {
                WaitState::Attached => present,
                WaitState::Detached => !present,
            };
            if reached {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(DOM_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn count(&self, selector: &str) -> BrowserResult<usize> {
        self.eval(format!(
            "JSON.stringify(document.querySelectorAll({}).length)",
            js(selector)
        ))
        .await
    }

    async fn mark_text(
        &self,
        scope: Option<&str>,
        phrase: &str,
        marker: &str,
    ) -> BrowserResult<bool> {
        let scope = js(scope.unwrap_or("*"));
        let script = format!(
            r#"JSON.stringify(((scope, phrase, attr, marker) => {{
    const matches = Array.from(document.querySelectorAll(scope)).filter(
        (el) => (el.innerText || el.textContent || '').trim() === phrase
    );
    const innermost = matches.find((el) => !matches.some((other) => other !== el && el.contains(other)));
    if (!innermost) return false;
    innermost.setAttribute(attr, marker);
    return true;
}})({scope}, {}, {}, {}))"#,
            js(phrase),
            js(MARKER_ATTRIBUTE),
            js(marker)
        );
        self.eval(script).await
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.page.find_element(selector).await?.click().await?;
        Ok(())
    }

    async fn activate(&self, selector: &str) -> BrowserResult<()> {
        let clicked: bool = self
            .eval(format!(
                r#"JSON.stringify((() => {{
    const el = document.querySelector({});
    if (!el) return false;
    el.scrollIntoView({{ block: 'center' }});
    el.click();
    return true;
}})())"#,
                js(selector)
            ))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn click_text(&self, text: &str) -> BrowserResult<()> {
        let marker = Uuid::new_v4().simple().to_string();
        let script = format!(
            r#"JSON.stringify(((phrase, attr, marker) => {{
    const squash = (value) => (value || '').replace(/\s+/g, ' ').trim();
    const wanted = squash(phrase);
    const matches = Array.from(document.querySelectorAll('body *')).filter(
        (el) => squash(el.innerText || el.textContent).includes(wanted)
    );
    const innermost = matches.find((el) => !matches.some((other) => other !== el && el.contains(other)));
    if (!innermost) return false;
    innermost.setAttribute(attr, marker);
    return true;
}})({}, {}, {}))"#,
            js(text),
            js(MARKER_ATTRIBUTE),
            js(&marker)
        );
        let marked: bool = self.eval(script).await?;
        if !marked {
            return Err(BrowserError::ElementNotFound(format!("text={text}")));
        }
        self.click_marked(&marker).await
    }

    async fn click_within(&self, item: &str, index: usize, child: &str) -> BrowserResult<()> {
        let marker = Uuid::new_v4().simple().to_string();
        let marked: bool = self
            .eval(format!(
                r#"JSON.stringify(((item, index, child, attr, marker) => {{
    const host = document.querySelectorAll(item)[index];
    const target = host ? host.querySelector(child) : null;
    if (!target) return false;
    target.setAttribute(attr, marker);
    return true;
}})({}, {index}, {}, {}, {}))"#,
                js(item),
                js(child),
                js(MARKER_ATTRIBUTE),
                js(&marker)
            ))
            .await?;
        if !marked {
            return Err(BrowserError::ElementNotFound(format!(
                "{item}[{index}] {child}"
            )));
        }
        self.click_marked(&marker).await
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        let filled: bool = self
            .eval(format!(
                r#"JSON.stringify(((selector, value) => {{
    const el = document.querySelector(selector);
    if (!el) return false;
    el.focus();
    if (el.isContentEditable) {{
        el.textContent = value;
    }} else {{
        const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
        const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
        setter.call(el, value);
    }}
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})({}, {}))"#,
                js(selector),
                js(value)
            ))
            .await?;
        if filled {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn press_key(&self, selector: &str, key: &str) -> BrowserResult<()> {
        self.page.find_element(selector).await?.press_key(key).await?;
        Ok(())
    }

    async fn set_files(&self, selector: &str, files: &[PathBuf]) -> BrowserResult<()> {
        let element = self.page.find_element(selector).await?;
        let files = files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        let params = SetFileInputFilesParams::builder()
            .files(files)
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn read_text(&self, selector: &str) -> BrowserResult<Option<String>> {
        self.eval(format!(
            "JSON.stringify(({})(document.querySelector({})))",
            element_text(),
            js(selector)
        ))
        .await
    }

    async fn read_all_text(&self, selector: &str) -> BrowserResult<Vec<String>> {
        self.eval(format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map({}))",
            js(selector),
            element_text()
        ))
        .await
    }

    async fn read_text_within(
        &self,
        item: &str,
        index: usize,
        field: &str,
    ) -> BrowserResult<Option<String>> {
        self.eval(format!(
            r#"JSON.stringify(((item, index, field) => {{
    const host = document.querySelectorAll(item)[index];
    return ({})(host ? host.querySelector(field) : null);
}})({}, {index}, {}))"#,
            element_text(),
            js(item),
            js(field)
        ))
        .await
    }

    async fn add_cookies(&self, cookies: &[CookieRecord]) -> BrowserResult<()> {
        let params = cookies
            .iter()
            .map(cookie_param)
            .collect::<BrowserResult<Vec<_>>>()?;
        // Sent as a raw command: the page is still blank at this point and
        // `Page::set_cookies` refuses cookies for non-http pages.
        self.page.execute(SetCookiesParams::new(params)).await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page.save_screenshot(params, path).await?;
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.page.clone().close().await?;
        Ok(())
    }
}

/// Origin a cookie belongs to, so it can be set before any navigation.
fn cookie_url(cookie: &CookieRecord) -> String {
    let host = cookie.domain.trim_start_matches('.');
    let path = if cookie.path.starts_with('/') {
        cookie.path.as_str()
    } else {
        "/"
    };
    format!("https://{host}{path}")
}

fn cookie_param(cookie: &CookieRecord) -> BrowserResult<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .url(cookie_url(cookie))
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .http_only(cookie.http_only)
        .secure(cookie.secure);
    if let Some(expires) = cookie.expires.filter(|value| *value > 0.0) {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    if let Some(same_site) = cookie.same_site.as_deref().and_then(same_site) {
        builder = builder.same_site(same_site);
    }
    builder.build().map_err(BrowserError::Configuration)
}

fn same_site(value: &str) -> Option<CookieSameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" => Some(CookieSameSite::None),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_literals_are_escaped() {
        assert_eq!(js(r#"input[placeholder*="标题"]"#), r#""input[placeholder*=\"标题\"]""#);
    }

    #[test]
    fn same_site_parsing_is_case_insensitive() {
        assert_eq!(same_site("Lax"), Some(CookieSameSite::Lax));
        assert_eq!(same_site("no_restriction"), None);
    }

    #[test]
    fn cookie_params_carry_an_origin_url() {
        let cookie = CookieRecord {
            name: "web_session".into(),
            value: "abc".into(),
            domain: ".xiaohongshu.com".into(),
            path: "/".into(),
            expires: Some(1_900_000_000.0),
            http_only: true,
            secure: true,
            same_site: Some("Lax".into()),
        };

        let param = cookie_param(&cookie).unwrap();

        assert_eq!(param.url.as_deref(), Some("https://xiaohongshu.com/"));
        assert_eq!(param.domain.as_deref(), Some(".xiaohongshu.com"));
        assert_eq!(param.same_site, Some(CookieSameSite::Lax));
        assert!(param.expires.is_some());
    }

    #[test]
    fn cookie_url_ignores_relative_paths() {
        let cookie = CookieRecord {
            name: "a1".into(),
            value: "v".into(),
            domain: "creator.xiaohongshu.com".into(),
            path: "publish".into(),
            expires: None,
            http_only: false,
            secure: false,
            same_site: None,
        };
        assert_eq!(cookie_url(&cookie), "https://creator.xiaohongshu.com/");
    }

    #[test]
    fn launcher_builds_config_from_section() {
        let launcher = ChromiumLauncher::new(BrowserSection {
            executable_path: Some("/usr/bin/chromium".into()),
            headless: false,
            sandbox: false,
            ..BrowserSection::default()
        });
        assert!(launcher.build_chromium_config().is_ok());
    }
}
