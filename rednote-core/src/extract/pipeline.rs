use std::time::Duration;

use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::browser::{
    BrowserError, BrowserResult, DelayScheduler, LocateStrategy, Located, MetricsHandle,
    PageDriver, SelectorCandidate, SelectorResolver, WaitState,
};
use crate::config::{
    CommentSchema, NoteSchema, PacingSection, RednoteConfig, SchemaSection, SessionSection,
    SiteSection, TimeoutSection,
};

use super::models::{parse_count, ExtractedComment, ExtractedNote};
use super::url::{extract_note_url, is_note_permalink};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn describe(candidates: &[LocateStrategy]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Reads notes and comments off an already-acquired page.
///
/// Per-item failures are logged and skipped; only navigation and missing
/// containers fail the whole call.
#[derive(Debug, Clone)]
pub struct NoteExtractor {
    site: SiteSection,
    session: SessionSection,
    timeouts: TimeoutSection,
    pacing: PacingSection,
    schema: SchemaSection,
    resolver: SelectorResolver,
    delays: DelayScheduler,
    metrics: MetricsHandle,
}

impl NoteExtractor {
    pub fn new(config: &RednoteConfig, delays: DelayScheduler, metrics: MetricsHandle) -> Self {
        Self {
            site: config.site.clone(),
            session: config.session.clone(),
            timeouts: config.timeouts.clone(),
            pacing: config.pacing.clone(),
            schema: config.schema.clone(),
            resolver: SelectorResolver::new(ms(config.timeouts.poll_interval_ms)),
            delays,
            metrics,
        }
    }

    pub fn search_url(&self, keywords: &str) -> String {
        let encoded = form_urlencoded::byte_serialize(keywords.trim().as_bytes()).collect::<String>();
        self.site.search_url_template.replace("{keyword}", &encoded)
    }

    /// Loads the home page and checks the sidebar user entry.
    pub async fn verify_login(&self, page: &dyn PageDriver) -> BrowserResult<()> {
        if !self.session.verify_login {
            return Ok(());
        }
        page.goto(&self.site.home_url, ms(self.timeouts.navigation_ms))
            .await?;
        let selector = self.session.logged_in_selector.as_str();
        let present = page
            .wait_for(selector, WaitState::Attached, ms(self.timeouts.field_candidate_ms))
            .await?;
        let label = if present {
            page.read_text(selector).await?
        } else {
            None
        };
        match label {
            Some(text) if text == self.session.logged_in_text => {
                debug!("login verified");
                Ok(())
            }
            _ => Err(BrowserError::AuthRequired(
                "not logged in; log in again to refresh the cookie file".into(),
            )),
        }
    }

    pub async fn search(
        &self,
        page: &dyn PageDriver,
        keywords: &str,
        limit: usize,
    ) -> BrowserResult<Vec<ExtractedNote>> {
        let schema = &self.schema.search;
        let url = self.search_url(keywords);
        info!(%keywords, limit, "searching notes");
        page.goto(&url, ms(self.timeouts.navigation_ms)).await?;
        self.await_container(page, &schema.container).await?;

        let available = page.count(&schema.item).await?;
        let total = available.min(limit);
        debug!(available, total, "search results listed");

        let mut notes = Vec::with_capacity(total);
        for index in 0..total {
            match self.extract_search_item(page, index).await {
                Ok(note) => {
                    self.metrics.with(|m| m.record_notes(1));
                    notes.push(note);
                }
                Err(err) => {
                    warn!(index, error = %err, "skipping search result");
                    self.metrics.with(|m| m.record_extraction_failure());
                    if let Err(err) = self.close_overlay(page).await {
                        debug!(index, error = %err, "overlay cleanup failed");
                    }
                }
            }
            if index + 1 < total {
                self.delays.jitter(self.pacing.between_items_ms).await;
            }
        }
        info!(count = notes.len(), "search finished");
        Ok(notes)
    }

    async fn extract_search_item(
        &self,
        page: &dyn PageDriver,
        index: usize,
    ) -> BrowserResult<ExtractedNote> {
        let schema = &self.schema.search;
        page.click_within(&schema.item, index, &schema.cover).await?;
        if self
            .locate(page, &schema.overlay, ms(self.timeouts.overlay_ms))
            .await
            .is_none()
        {
            return Err(BrowserError::ElementNotFound(describe(&schema.overlay)));
        }
        self.delays.jitter(self.pacing.overlay_open_ms).await;

        let mut note = self.read_note(page).await;
        note.url = match page.current_url().await {
            Ok(url) if is_note_permalink(&url) => url,
            _ => String::new(),
        };

        self.delays.jitter(self.pacing.overlay_close_ms).await;
        if let Err(err) = self.close_overlay(page).await {
            warn!(index, error = %err, "overlay stayed open after reading note");
        }
        Ok(note)
    }

    /// Closes an open overlay and waits for it to detach. A missing overlay
    /// is not an error.
    async fn close_overlay(&self, page: &dyn PageDriver) -> BrowserResult<()> {
        let schema = &self.schema.search;
        let Some(overlay) = self.locate(page, &schema.overlay, Duration::ZERO).await else {
            return Ok(());
        };
        let Some(button) = self
            .locate(page, &schema.close_button, Duration::ZERO)
            .await
        else {
            return Err(BrowserError::ElementNotFound(describe(&schema.close_button)));
        };
        page.click(&button.selector).await?;
        let closed = page
            .wait_for(&overlay.selector, WaitState::Detached, ms(self.timeouts.overlay_ms))
            .await?;
        if !closed {
            return Err(BrowserError::Timeout(format!(
                "overlay {} to close",
                overlay.strategy
            )));
        }
        Ok(())
    }

    /// Accepts a note URL or copied share text.
    pub async fn note_detail(
        &self,
        page: &dyn PageDriver,
        url_or_share_text: &str,
    ) -> BrowserResult<ExtractedNote> {
        let url = extract_note_url(url_or_share_text.trim());
        info!(%url, "reading note detail");
        page.goto(&url, ms(self.timeouts.navigation_ms)).await?;
        self.await_container(page, &self.schema.note.container).await?;

        let mut note = self.read_note(page).await;
        note.url = match page.current_url().await {
            Ok(current) if is_note_permalink(&current) => current,
            _ => url,
        };
        self.metrics.with(|m| m.record_notes(1));
        Ok(note)
    }

    pub async fn comments(
        &self,
        page: &dyn PageDriver,
        url_or_share_text: &str,
    ) -> BrowserResult<Vec<ExtractedComment>> {
        let schema = &self.schema.comments;
        let url = extract_note_url(url_or_share_text.trim());
        info!(%url, "reading comments");
        page.goto(&url, ms(self.timeouts.navigation_ms)).await?;
        self.await_container(page, &schema.container).await?;

        let total = page.count(&schema.item).await?;
        let mut comments = Vec::with_capacity(total);
        for index in 0..total {
            comments.push(self.read_comment(page, schema, index).await);
        }
        self.metrics.with(|m| m.record_comments(comments.len()));
        info!(count = comments.len(), "comments collected");
        Ok(comments)
    }

    async fn locate(
        &self,
        page: &dyn PageDriver,
        candidates: &[LocateStrategy],
        window: Duration,
    ) -> Option<Located> {
        self.resolver
            .resolve(page, &SelectorCandidate::ranked(candidates, window))
            .await
            .located()
    }

    async fn await_container(
        &self,
        page: &dyn PageDriver,
        candidates: &[LocateStrategy],
    ) -> BrowserResult<()> {
        match self
            .locate(page, candidates, ms(self.timeouts.container_ms))
            .await
        {
            Some(found) => {
                debug!(container = %found.strategy, "container ready");
                Ok(())
            }
            None => Err(BrowserError::ContainerNotFound {
                selector: describe(candidates),
            }),
        }
    }

    /// Text of the first field candidate present on the page, empty when none is.
    async fn field_text(&self, page: &dyn PageDriver, candidates: &[LocateStrategy]) -> String {
        match self.locate(page, candidates, Duration::ZERO).await {
            Some(found) => text_or_default(page, &found.selector).await,
            None => String::new(),
        }
    }

    async fn read_note(&self, page: &dyn PageDriver) -> ExtractedNote {
        let schema: &NoteSchema = &self.schema.note;
        let tags = match page.read_all_text(&schema.tags).await {
            Ok(values) => values
                .into_iter()
                .map(|tag| tag.trim().trim_start_matches('#').to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            Err(err) => {
                debug!(error = %err, "tags unavailable");
                Vec::new()
            }
        };
        ExtractedNote {
            title: self.field_text(page, &schema.title).await,
            content: self.field_text(page, &schema.content).await,
            tags,
            url: String::new(),
            author: self.field_text(page, &schema.author).await,
            likes: parse_count(&self.field_text(page, &schema.likes).await),
            collects: parse_count(&self.field_text(page, &schema.collects).await),
            comments: parse_count(&self.field_text(page, &schema.comments).await),
            published_at: self.field_text(page, &schema.published_at).await,
        }
    }

    async fn read_comment(
        &self,
        page: &dyn PageDriver,
        schema: &CommentSchema,
        index: usize,
    ) -> ExtractedComment {
        ExtractedComment {
            author: text_within_or_default(page, &schema.item, index, &schema.author).await,
            content: text_within_or_default(page, &schema.item, index, &schema.content).await,
            likes: parse_count(&text_within_or_default(page, &schema.item, index, &schema.likes).await),
            time: text_within_or_default(page, &schema.item, index, &schema.time).await,
        }
    }
}

async fn text_or_default(page: &dyn PageDriver, selector: &str) -> String {
    match page.read_text(selector).await {
        Ok(value) => value.unwrap_or_default(),
        Err(err) => {
            debug!(selector, error = %err, "field unavailable");
            String::new()
        }
    }
}

async fn text_within_or_default(
    page: &dyn PageDriver,
    item: &str,
    index: usize,
    field: &str,
) -> String {
    match page.read_text_within(item, index, field).await {
        Ok(value) => value.unwrap_or_default(),
        Err(err) => {
            debug!(index, field, error = %err, "comment field unavailable");
            String::new()
        }
    }
}
